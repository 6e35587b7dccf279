//! Test doubles for every stage family.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::component::{
    ContextListener, FrameReader, FrameTransform, FrameWriter, TransformTask,
};
use crate::condition::Condition;
use crate::config::ComponentConfig;
use crate::context::{JobContext, TransactionContext};
use crate::errors::{ConfigurationError, DatexError};
use crate::record::Record;

/// A reader serving a scripted list of records.
///
/// Marks the final record with the last-frame flag, the way a well-behaved
/// reader that knows its length does. Optionally fails after a set number of
/// successful reads to script mid-stream faults.
#[derive(Debug)]
pub struct VecReader {
    options: ComponentConfig,
    queue: VecDeque<Record>,
    fail_after: Option<usize>,
    reads: usize,
}

impl VecReader {
    /// Creates a reader over `records`.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            options: ComponentConfig::new(),
            queue: records.into(),
            fail_after: None,
            reads: 0,
        }
    }

    /// Creates a reader that serves `records` but fails on read `n + 1`.
    #[must_use]
    pub fn failing_after(records: Vec<Record>, n: usize) -> Self {
        let mut reader = Self::new(records);
        reader.fail_after = Some(n);
        reader
    }

    /// Creates the reader from options; records come from the `records`
    /// option, an array of objects.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            queue: VecDeque::new(),
            fail_after: None,
            reads: 0,
        }
    }
}

#[async_trait]
impl FrameReader for VecReader {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        if let Some(value) = self.options.get("records") {
            let items = value.as_array().ok_or_else(|| {
                ConfigurationError::invalid_option("VecReader", "records", "expected an array")
            })?;
            for item in items {
                let record = Record::from_value(item.clone()).ok_or_else(|| {
                    ConfigurationError::invalid_option(
                        "VecReader",
                        "records",
                        "expected an array of objects",
                    )
                })?;
                self.queue.push_back(record);
            }
        }
        Ok(())
    }

    async fn read(&mut self, tx: &mut TransactionContext) -> Result<Option<Record>, DatexError> {
        if let Some(limit) = self.fail_after {
            if self.reads >= limit {
                return Err(DatexError::processing("VecReader", "scripted read fault"));
            }
        }
        let record = self.queue.pop_front();
        if record.is_some() {
            self.reads += 1;
            if self.queue.is_empty() && self.fail_after.is_none() {
                tx.set_last_frame(true);
            }
        }
        Ok(record)
    }
}

/// A shared handle onto records collected by a writer.
#[derive(Debug, Clone, Default)]
pub struct RecordSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl RecordSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything written so far.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Number of records written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn push(&self, record: Record) {
        self.records.lock().push(record);
    }
}

/// A writer that collects records into a [`RecordSink`].
///
/// Keeps the bookkeeping a real sink would: a row counter bumped only on
/// actual writes and a note of whether a written record carried the
/// last-frame mark.
#[derive(Debug)]
pub struct CollectingWriter {
    options: ComponentConfig,
    sink: RecordSink,
    condition: Option<Condition>,
    rows_written: u64,
    saw_last_frame: bool,
}

impl CollectingWriter {
    /// Creates a writer with a fresh sink.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(ComponentConfig::new())
    }

    /// Creates the writer from options; `condition` holds the
    /// conditional-write expression.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            sink: RecordSink::new(),
            condition: None,
            rows_written: 0,
            saw_last_frame: false,
        }
    }

    /// Collects into `sink` instead of the writer's own.
    #[must_use]
    pub fn with_sink(mut self, sink: RecordSink) -> Self {
        self.sink = sink;
        self
    }

    /// Writes only records the expression accepts.
    ///
    /// # Panics
    /// Panics when the expression does not parse; use configuration options
    /// to exercise parse failures.
    #[must_use]
    pub fn with_condition(mut self, expression: &str) -> Self {
        self.condition = Some(Condition::parse(expression).expect("condition should parse"));
        self
    }

    /// A handle onto the collected records.
    #[must_use]
    pub fn sink(&self) -> RecordSink {
        self.sink.clone()
    }

    /// Rows actually written.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// True when a written record carried the last-frame mark.
    #[must_use]
    pub fn saw_last_frame(&self) -> bool {
        self.saw_last_frame
    }
}

impl Default for CollectingWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameWriter for CollectingWriter {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        if self.condition.is_none() {
            if let Some(text) = self.options.condition() {
                let condition = Condition::parse(text).map_err(|e| {
                    ConfigurationError::invalid_option("CollectingWriter", "condition", &e.to_string())
                })?;
                self.condition = Some(condition);
            }
        }
        Ok(())
    }

    fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    async fn write(&mut self, tx: &TransactionContext) -> Result<(), DatexError> {
        self.rows_written += 1;
        if tx.is_last_frame() {
            self.saw_last_frame = true;
        }
        self.sink.push(tx.target().clone());
        Ok(())
    }
}

/// A shared handle onto the document built by a [`FramedWriter`].
#[derive(Debug, Clone, Default)]
pub struct DocumentSink {
    text: Arc<Mutex<String>>,
}

impl DocumentSink {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The document text so far.
    #[must_use]
    pub fn text(&self) -> String {
        self.text.lock().clone()
    }
}

/// A writer that frames records into one aggregate JSON array document.
///
/// The first written record opens the array, every further one is preceded
/// by a separator, and the record carrying the last-frame mark closes it.
/// A run that halts early leaves the document unterminated, which is
/// exactly what tests need to observe.
#[derive(Debug, Default)]
pub struct FramedWriter {
    document: DocumentSink,
    rows_written: u64,
}

impl FramedWriter {
    /// Creates a writer with a fresh document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds into `document` instead of the writer's own.
    #[must_use]
    pub fn with_document(mut self, document: DocumentSink) -> Self {
        self.document = document;
        self
    }

    /// A handle onto the document.
    #[must_use]
    pub fn document(&self) -> DocumentSink {
        self.document.clone()
    }
}

#[async_trait]
impl FrameWriter for FramedWriter {
    async fn write(&mut self, tx: &TransactionContext) -> Result<(), DatexError> {
        let mut text = self.document.text.lock();
        if self.rows_written == 0 {
            text.push('[');
        } else {
            text.push(',');
        }
        text.push_str(&tx.target().to_string());
        if tx.is_last_frame() {
            text.push(']');
        }
        self.rows_written += 1;
        Ok(())
    }
}

/// A transform that fails on cue.
#[derive(Debug)]
pub struct FailingTransform {
    fail_on_row: Option<u64>,
}

impl FailingTransform {
    /// Fails on every record.
    #[must_use]
    pub fn always() -> Self {
        Self { fail_on_row: None }
    }

    /// Fails only on row `row`, passing other records through.
    #[must_use]
    pub fn on_row(row: u64) -> Self {
        Self {
            fail_on_row: Some(row),
        }
    }
}

#[async_trait]
impl FrameTransform for FailingTransform {
    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError> {
        match self.fail_on_row {
            Some(row) if tx.row() != row => Ok(()),
            _ => Err(DatexError::processing(
                "FailingTransform",
                format!("scripted fault on row {}", tx.row()),
            )),
        }
    }
}

/// A writer that fails on cue, collecting records written before the fault.
#[derive(Debug)]
pub struct FailingWriter {
    sink: RecordSink,
    fail_on_row: u64,
}

impl FailingWriter {
    /// Fails when asked to write row `row`.
    #[must_use]
    pub fn on_row(row: u64) -> Self {
        Self {
            sink: RecordSink::new(),
            fail_on_row: row,
        }
    }

    /// A handle onto the records written before the fault.
    #[must_use]
    pub fn sink(&self) -> RecordSink {
        self.sink.clone()
    }
}

#[async_trait]
impl FrameWriter for FailingWriter {
    async fn write(&mut self, tx: &TransactionContext) -> Result<(), DatexError> {
        if tx.row() == self.fail_on_row {
            return Err(DatexError::processing(
                "FailingWriter",
                format!("scripted fault on row {}", tx.row()),
            ));
        }
        self.sink.push(tx.target().clone());
        Ok(())
    }
}

/// A task that fails every execution, with a configurable halt policy.
#[derive(Debug)]
pub struct FailingTask {
    halt_on_error: bool,
    executions: u64,
}

impl FailingTask {
    /// Creates a failing task; `halt_on_error` mirrors the real option.
    #[must_use]
    pub fn new(halt_on_error: bool) -> Self {
        Self {
            halt_on_error,
            executions: 0,
        }
    }

    /// Number of times the task was executed.
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions
    }
}

#[async_trait]
impl TransformTask for FailingTask {
    async fn execute(&mut self, _ctx: &Arc<JobContext>) -> Result<(), DatexError> {
        self.executions += 1;
        Err(DatexError::processing("FailingTask", "scripted task fault"))
    }

    fn halt_on_error(&self) -> bool {
        self.halt_on_error
    }
}

/// A shared handle onto events seen by a [`RecordingListener`].
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events seen so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

/// A listener recording every notification as a compact string.
#[derive(Debug, Default)]
pub struct RecordingListener {
    log: EventLog,
}

impl RecordingListener {
    /// Creates a listener with a fresh log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records into `log` instead of the listener's own.
    #[must_use]
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    /// A handle onto the recorded events.
    #[must_use]
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

#[async_trait]
impl ContextListener for RecordingListener {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.log.push("open".to_string());
        Ok(())
    }

    async fn on_read(&mut self, tx: &TransactionContext) {
        self.log.push(format!("read {}", tx.row()));
    }

    async fn on_validation_failed(
        &mut self,
        tx: &TransactionContext,
        validator: &str,
        _description: &str,
    ) {
        self.log.push(format!("invalid {} {}", tx.row(), validator));
    }

    async fn on_write(&mut self, tx: &TransactionContext) {
        self.log.push(format!("write {}", tx.row()));
    }

    async fn on_error(&mut self, _ctx: &Arc<JobContext>) {
        self.log.push("error".to_string());
    }

    async fn close(&mut self) {
        self.log.push("close".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{numbered_records, transaction};

    #[tokio::test]
    async fn test_vec_reader_marks_the_final_record() {
        let mut reader = VecReader::new(numbered_records(2));
        let mut tx = transaction(1);

        assert!(reader.read(&mut tx).await.unwrap().is_some());
        assert!(!tx.is_last_frame());

        assert!(reader.read(&mut tx).await.unwrap().is_some());
        assert!(tx.is_last_frame());

        assert!(reader.read(&mut tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vec_reader_scripted_fault() {
        let mut reader = VecReader::failing_after(numbered_records(3), 1);
        let mut tx = transaction(1);

        assert!(reader.read(&mut tx).await.is_ok());
        assert!(reader.read(&mut tx).await.is_err());
    }

    #[tokio::test]
    async fn test_collecting_writer_tracks_rows_and_final_frame() {
        let mut writer = CollectingWriter::new();
        let sink = writer.sink();

        let mut tx = transaction(1);
        tx.target_mut().set("id", 1);
        writer.write(&tx).await.unwrap();
        assert!(!writer.saw_last_frame());

        let mut tx = transaction(2);
        tx.target_mut().set("id", 2);
        tx.set_last_frame(true);
        writer.write(&tx).await.unwrap();

        assert_eq!(writer.rows_written(), 2);
        assert!(writer.saw_last_frame());
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_framed_writer_row_bookkeeping() {
        let mut writer = FramedWriter::new();
        let document = writer.document();

        let mut tx = transaction(1);
        tx.target_mut().set("id", 1);
        writer.write(&tx).await.unwrap();
        assert_eq!(document.text(), r#"[{"id":1}"#);

        let mut tx = transaction(2);
        tx.target_mut().set("id", 2);
        tx.set_last_frame(true);
        writer.write(&tx).await.unwrap();
        assert_eq!(document.text(), r#"[{"id":1},{"id":2}]"#);
    }
}
