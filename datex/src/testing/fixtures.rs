//! Fixtures for engine and component tests.

use std::sync::Arc;

use crate::context::{JobContext, TransactionContext};
use crate::record::Record;

/// Parses a record from JSON text.
///
/// # Panics
/// Panics on malformed JSON or a non-object value; this is test support.
#[must_use]
pub fn record(text: &str) -> Record {
    let value = serde_json::from_str(text).expect("record JSON should parse");
    Record::from_value(value).expect("record JSON should be an object")
}

/// Parses records from a JSON array of objects.
///
/// # Panics
/// Panics on malformed JSON or non-object elements; this is test support.
#[must_use]
pub fn records(text: &str) -> Vec<Record> {
    let value: serde_json::Value = serde_json::from_str(text).expect("records JSON should parse");
    value
        .as_array()
        .expect("records JSON should be an array")
        .iter()
        .map(|item| Record::from_value(item.clone()).expect("record JSON should be an object"))
        .collect()
}

/// Builds `n` records shaped `{"id": 1..=n}`.
#[must_use]
pub fn numbered_records(n: usize) -> Vec<Record> {
    (1..=n)
        .map(|i| {
            let mut record = Record::new();
            record.set("id", i);
            record
        })
        .collect()
}

/// A fresh job context for a test.
#[must_use]
pub fn job_context(name: &str) -> Arc<JobContext> {
    Arc::new(JobContext::new(name))
}

/// A transaction context for row `row` on a fresh job context.
#[must_use]
pub fn transaction(row: u64) -> TransactionContext {
    TransactionContext::new(job_context("test"), row)
}
