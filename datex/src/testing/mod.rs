//! Test support for datex pipelines.
//!
//! This module provides:
//! - Doubles for every stage family (scripted readers, collecting and
//!   framing writers, failing transforms, recording listeners)
//! - Fixtures for records and contexts
//!
//! It is a regular public module so downstream crates can test their own
//! stages with the same tools.

mod fixtures;
mod mocks;

pub use fixtures::{job_context, numbered_records, record, records, transaction};
pub use mocks::{
    CollectingWriter, DocumentSink, EventLog, FailingTask, FailingTransform, FailingWriter,
    FramedWriter, RecordSink, RecordingListener, VecReader,
};
