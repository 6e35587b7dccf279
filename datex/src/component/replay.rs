//! A reader that buffers its source and serves a derived stream.
//!
//! Some sources must be read in full before the records that actually flow
//! downstream can be computed (summaries, metrics, windowed aggregates).
//! [`ReplayReader`] makes that pattern explicit: a priming phase drains the
//! inner reader, a derive function turns the buffered records into the
//! records to serve, and a replaying phase serves them with correct
//! final-record marking. Ingesting M source records and deriving P records
//! serves exactly P records; the primed records themselves never reach the
//! pipeline.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{JobContext, TransactionContext};
use crate::errors::{ConfigurationError, DatexError};
use crate::record::Record;

use super::FrameReader;

type DeriveFn = dyn Fn(Vec<Record>) -> Vec<Record> + Send + Sync;

enum ReplayState {
    /// The inner reader has not been drained yet.
    Priming,
    /// Serving derived records.
    Replaying { queue: VecDeque<Record> },
}

/// Wraps an inner reader, replacing its stream with a derived one.
pub struct ReplayReader {
    inner: Box<dyn FrameReader>,
    derive: Box<DeriveFn>,
    state: ReplayState,
}

impl ReplayReader {
    /// Wraps `inner`, deriving the served stream with `derive`.
    pub fn new<R, F>(inner: R, derive: F) -> Self
    where
        R: FrameReader + 'static,
        F: Fn(Vec<Record>) -> Vec<Record> + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(inner),
            derive: Box::new(derive),
            state: ReplayState::Priming,
        }
    }

    /// True while the inner reader has not been drained.
    #[must_use]
    pub fn is_priming(&self) -> bool {
        matches!(self.state, ReplayState::Priming)
    }
}

impl Debug for ReplayReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ReplayState::Priming => "priming".to_string(),
            ReplayState::Replaying { queue } => format!("replaying ({} queued)", queue.len()),
        };
        f.debug_struct("ReplayReader")
            .field("inner", &self.inner)
            .field("state", &state)
            .finish()
    }
}

#[async_trait]
impl FrameReader for ReplayReader {
    async fn open(&mut self, ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.inner.open(ctx).await
    }

    async fn read(&mut self, tx: &mut TransactionContext) -> Result<Option<Record>, DatexError> {
        loop {
            match &mut self.state {
                ReplayState::Priming => {
                    let mut primed = Vec::new();
                    while let Some(record) = self.inner.read(tx).await? {
                        primed.push(record);
                    }
                    // The drain may have marked the source's real final
                    // record; the mark belongs to the derived stream now.
                    tx.set_last_frame(false);
                    let queue = (self.derive)(primed).into();
                    self.state = ReplayState::Replaying { queue };
                }
                ReplayState::Replaying { queue } => {
                    let record = queue.pop_front();
                    if record.is_some() && queue.is_empty() {
                        tx.set_last_frame(true);
                    }
                    return Ok(record);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::VecReader;
    use serde_json::json;

    fn source_records(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| {
                let mut record = Record::new();
                record.set("id", i);
                record
            })
            .collect()
    }

    fn tx() -> TransactionContext {
        TransactionContext::new(Arc::new(JobContext::new("replay-test")), 1)
    }

    #[tokio::test]
    async fn test_serves_derived_not_primed_records() {
        let derive = |records: Vec<Record>| {
            let mut summary = Record::new();
            summary.set("ingested", records.len());
            let mut flag = Record::new();
            flag.set("done", true);
            vec![summary, flag]
        };
        let mut reader = ReplayReader::new(VecReader::new(source_records(4)), derive);
        let mut tx = tx();

        let first = reader.read(&mut tx).await.unwrap().unwrap();
        assert_eq!(first.get("ingested"), Some(&json!(4)));
        assert!(!tx.is_last_frame());
        assert!(!reader.is_priming());

        let second = reader.read(&mut tx).await.unwrap().unwrap();
        assert_eq!(second.get("done"), Some(&json!(true)));
        assert!(tx.is_last_frame());

        assert!(reader.read(&mut tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_priming_clears_inner_final_mark() {
        // VecReader marks its own final record; with three derived records
        // that mark must not leak onto the first served one.
        let derive = |_: Vec<Record>| source_records(3);
        let mut reader = ReplayReader::new(VecReader::new(source_records(5)), derive);
        let mut tx = tx();

        assert!(reader.read(&mut tx).await.unwrap().is_some());
        assert!(!tx.is_last_frame());
        assert!(reader.read(&mut tx).await.unwrap().is_some());
        assert!(!tx.is_last_frame());
        assert!(reader.read(&mut tx).await.unwrap().is_some());
        assert!(tx.is_last_frame());
    }

    #[tokio::test]
    async fn test_empty_derivation_is_immediate_end_of_stream() {
        let mut reader = ReplayReader::new(VecReader::new(source_records(3)), |_| Vec::new());
        let mut tx = tx();

        assert!(reader.read(&mut tx).await.unwrap().is_none());
        assert!(!tx.is_last_frame());
    }

    #[tokio::test]
    async fn test_single_derived_record_marked_final() {
        let derive = |records: Vec<Record>| {
            let mut total = Record::new();
            total.set("total", records.len());
            vec![total]
        };
        let mut reader = ReplayReader::new(VecReader::new(source_records(2)), derive);
        let mut tx = tx();

        let only = reader.read(&mut tx).await.unwrap().unwrap();
        assert_eq!(only.get("total"), Some(&json!(2)));
        assert!(tx.is_last_frame());
        assert!(reader.read(&mut tx).await.unwrap().is_none());
    }
}
