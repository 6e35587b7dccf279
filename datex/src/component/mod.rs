//! The component contract shared by every pluggable stage.
//!
//! Each stage family gets its own capability trait rather than a deep
//! inheritance chain; shared option parsing lives on
//! [`ComponentConfig`](crate::config::ComponentConfig). All families share
//! the same lifecycle: `open` once with the job context, the family-specific
//! operation once per record (or once per run for tasks), `close` once.
//! `close` is best-effort and idempotent; it is called even when `open`
//! failed and it never reports an error.
//!
//! Stages are constructed once per run and reused for every record. They
//! must not retain per-record state across calls; run-scoped state (buffers,
//! row counters for framing) is fine.

mod replay;

pub use replay::ReplayReader;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::Condition;
use crate::context::{JobContext, TransactionContext};
use crate::errors::{ConfigurationError, DatexError};
use crate::record::Record;

/// Produces the record stream.
#[async_trait]
pub trait FrameReader: Send + Sync + Debug {
    /// Checks options and acquires the source. May defer I/O to the first
    /// `read`.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Returns the next record, or `Ok(None)` at end of stream.
    ///
    /// A reader that knows the returned record is the final one should mark
    /// it with [`TransactionContext::set_last_frame`].
    async fn read(&mut self, tx: &mut TransactionContext) -> Result<Option<Record>, DatexError>;

    /// Releases the source. Never fails.
    async fn close(&mut self) {}
}

/// Judges records without mutating them.
#[async_trait]
pub trait FrameValidator: Send + Sync + Debug {
    /// Checks options. Pattern-style validators compile their patterns here.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Returns whether the record under `tx` passes.
    ///
    /// Validators inspect the source record, the data as read, so earlier
    /// transforms can never mask a bad input.
    async fn validate(&mut self, tx: &TransactionContext) -> Result<bool, DatexError>;

    /// When true, a failed record also halts the run.
    fn halt_on_fail(&self) -> bool {
        false
    }

    /// The field this validator watches.
    fn field(&self) -> &str;

    /// Human-readable description used in failure messages.
    fn description(&self) -> &str;

    /// Releases resources. Never fails.
    async fn close(&mut self) {}
}

/// Rewrites the working record in place.
#[async_trait]
pub trait FrameTransform: Send + Sync + Debug {
    /// Checks options.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Mutates `tx.target_mut()`. Configured order is execution order.
    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError>;

    /// Releases resources. Never fails.
    async fn close(&mut self) {}
}

/// Consumes finished records.
#[async_trait]
pub trait FrameWriter: Send + Sync + Debug {
    /// Checks options and acquires the sink. Conditional writers parse
    /// their expression here.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// The conditional-write expression, when configured.
    ///
    /// The engine skips `write` for records the condition rejects, so a
    /// framed writer's row bookkeeping only ever sees written records.
    fn condition(&self) -> Option<&Condition> {
        None
    }

    /// Writes `tx.target()`. Framed writers consult `tx.is_last_frame()` to
    /// finish their enclosing document.
    async fn write(&mut self, tx: &TransactionContext) -> Result<(), DatexError>;

    /// Flushes and releases the sink. Never fails.
    async fn close(&mut self) {}
}

/// Observes context transitions.
///
/// Notifications are infallible; a listener that cannot keep up records the
/// problem itself (or raises the job halt signal) rather than failing the
/// transition that triggered it.
#[async_trait]
pub trait ContextListener: Send + Sync + Debug {
    /// Checks options.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// A record was read into `tx`.
    async fn on_read(&mut self, _tx: &TransactionContext) {}

    /// A validator rejected the record under `tx`.
    async fn on_validation_failed(
        &mut self,
        _tx: &TransactionContext,
        _validator: &str,
        _description: &str,
    ) {
    }

    /// The record under `tx` cleared the writer pass.
    async fn on_write(&mut self, _tx: &TransactionContext) {}

    /// The job halt signal was raised.
    async fn on_error(&mut self, _ctx: &Arc<JobContext>) {}

    /// Releases resources. Never fails.
    async fn close(&mut self) {}
}

/// A side effect run before or after the record flow.
#[async_trait]
pub trait TransformTask: Send + Sync + Debug {
    /// Checks options.
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Performs the task.
    async fn execute(&mut self, ctx: &Arc<JobContext>) -> Result<(), DatexError>;

    /// When true (the default), a task failure halts the job.
    fn halt_on_error(&self) -> bool {
        true
    }

    /// Releases resources. Never fails.
    async fn close(&mut self) {}
}
