//! Record-scoped state for one pass through the pipeline.

use std::sync::Arc;

use crate::record::Record;

use super::job::JobContext;

/// Context for a single record's trip from reader to writers.
///
/// Created by the engine immediately before each reader call and dropped
/// once the record has cleared the writers and listeners. The `source`
/// record is what the reader produced; the `target` record is the working
/// copy the transforms rewrite and the writers consume.
#[derive(Debug)]
pub struct TransactionContext {
    /// The owning job context.
    job: Arc<JobContext>,
    /// 1-based position of this record in the stream.
    row: u64,
    /// Record as produced by the reader.
    source: Record,
    /// Working copy consumed by writers.
    target: Record,
    /// True when this is known to be the final record of the run.
    last_frame: bool,
}

impl TransactionContext {
    /// Creates the context for row `row`.
    #[must_use]
    pub fn new(job: Arc<JobContext>, row: u64) -> Self {
        Self {
            job,
            row,
            source: Record::new(),
            target: Record::new(),
            last_frame: false,
        }
    }

    /// The owning job context.
    #[must_use]
    pub fn job(&self) -> &Arc<JobContext> {
        &self.job
    }

    /// 1-based position of this record in the stream.
    #[must_use]
    pub fn row(&self) -> u64 {
        self.row
    }

    /// The record as the reader produced it.
    #[must_use]
    pub fn source(&self) -> &Record {
        &self.source
    }

    /// Mutable access to the source record.
    pub fn source_mut(&mut self) -> &mut Record {
        &mut self.source
    }

    /// Replaces the source record.
    pub fn set_source(&mut self, record: Record) {
        self.source = record;
    }

    /// The working copy consumed by writers.
    #[must_use]
    pub fn target(&self) -> &Record {
        &self.target
    }

    /// Mutable access to the working copy.
    pub fn target_mut(&mut self) -> &mut Record {
        &mut self.target
    }

    /// Replaces the working copy.
    pub fn set_target(&mut self, record: Record) {
        self.target = record;
    }

    /// True when this is known to be the final record of the run.
    #[must_use]
    pub fn is_last_frame(&self) -> bool {
        self.last_frame
    }

    /// Marks or unmarks this record as the final one. Readers that buffer
    /// and re-serve records clear this while priming.
    pub fn set_last_frame(&mut self, last: bool) {
        self.last_frame = last;
    }

    /// Raises the job halt signal with a failure description.
    pub fn fail(&self, message: impl Into<String>) {
        self.job.fail(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_and_target_are_independent() {
        let job = Arc::new(JobContext::new("job"));
        let mut tx = TransactionContext::new(job, 1);

        let mut record = Record::new();
        record.set("id", 1);
        tx.set_source(record.clone());
        tx.set_target(record);

        tx.target_mut().set("seen", true);
        assert!(tx.target().contains("seen"));
        assert!(!tx.source().contains("seen"));
    }

    #[test]
    fn test_last_frame_flag() {
        let job = Arc::new(JobContext::new("job"));
        let mut tx = TransactionContext::new(job, 3);
        assert_eq!(tx.row(), 3);
        assert!(!tx.is_last_frame());

        tx.set_last_frame(true);
        assert!(tx.is_last_frame());
        tx.set_last_frame(false);
        assert!(!tx.is_last_frame());
    }

    #[test]
    fn test_fail_reaches_job_context() {
        let job = Arc::new(JobContext::new("job"));
        let tx = TransactionContext::new(Arc::clone(&job), 1);

        tx.fail("bad record");
        assert!(job.is_in_error());
        assert_eq!(job.error_message().as_deref(), Some("bad record"));
    }
}
