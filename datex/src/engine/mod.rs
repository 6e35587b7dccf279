//! The transform engine and its transaction loop.
//!
//! One engine owns one reader, ordered validators, transforms, writers and
//! listeners, pre- and post-process tasks, and the job context they share.
//! The loop is single-threaded and non-reentrant: stages for one engine are
//! always called from one logical task, in declared order, and no stage is
//! ever invoked concurrently with itself. The only in-core cancellation is
//! the job context error flag, which the loop polls at pass boundaries and
//! after every record.

mod builder;

pub use builder::EngineBuilder;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::component::{
    ContextListener, FrameReader, FrameTransform, FrameValidator, FrameWriter, TransformTask,
};
use crate::context::{
    ContextStatus, ContextStore, JobContext, TransactionContext, SYM_JOB_ID, SYM_JOB_NAME,
    SYM_RUN_DATE, SYM_RUN_TIME,
};

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, nothing opened.
    New,
    /// Stages opened; the context may already carry an open failure.
    Opened,
    /// The transaction loop ran (or is running).
    Running,
    /// Everything closed. Terminal, reachable from any state.
    Closed,
}

/// A stage and the name the configuration gave it.
#[derive(Debug)]
pub(crate) struct Slot<T: ?Sized> {
    pub(crate) name: String,
    pub(crate) stage: Box<T>,
}

impl<T: ?Sized> Slot<T> {
    pub(crate) fn new(name: impl Into<String>, stage: Box<T>) -> Self {
        Self {
            name: name.into(),
            stage,
        }
    }
}

/// Runs one job: open every stage, pump the transaction loop, close.
#[derive(Debug)]
pub struct TransformEngine {
    context: Arc<JobContext>,
    reader: Option<Slot<dyn FrameReader>>,
    validators: Vec<Slot<dyn FrameValidator>>,
    transforms: Vec<Slot<dyn FrameTransform>>,
    writers: Vec<Slot<dyn FrameWriter>>,
    listeners: Vec<Slot<dyn ContextListener>>,
    pre_tasks: Vec<Slot<dyn TransformTask>>,
    post_tasks: Vec<Slot<dyn TransformTask>>,
    symbol_seeds: Vec<(String, String)>,
    field_seeds: Map<String, Value>,
    store_path: Option<PathBuf>,
    state: EngineState,
    error_notified: bool,
}

impl TransformEngine {
    /// The shared job context.
    #[must_use]
    pub fn context(&self) -> &Arc<JobContext> {
        &self.context
    }

    /// Where the engine is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Opens the job context and every stage.
    ///
    /// Stage open failures are recorded into the context but the cascade
    /// continues, so every misconfigured stage gets to report its own
    /// complaint. The engine still transitions to `Opened`; `run` refuses to
    /// start while the context carries an error.
    pub async fn open(&mut self) {
        if self.state != EngineState::New {
            warn!(job = %self.context.name(), state = ?self.state, "open ignored");
            return;
        }

        self.context.mark_started();
        self.context.set_state("opening");
        let now = Utc::now();
        self.context.set_symbol(SYM_JOB_NAME, self.context.name());
        self.context.set_symbol(SYM_JOB_ID, self.context.id().to_string());
        self.context
            .set_symbol(SYM_RUN_DATE, now.format("%Y-%m-%d").to_string());
        self.context
            .set_symbol(SYM_RUN_TIME, now.format("%H:%M:%S").to_string());
        for (name, value) in &self.symbol_seeds {
            self.context.set_symbol(name.clone(), value.clone());
        }
        for (name, value) in &self.field_seeds {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.context.set_symbol(name.clone(), text);
        }

        if let Some(path) = &self.store_path {
            match ContextStore::open(path) {
                Ok(store) => self.context.attach_store(store),
                Err(e) => {
                    warn!(job = %self.context.name(), "context store open failed: {e}");
                    self.context.fail(format!("context store: {e}"));
                }
            }
        }

        for task in &mut self.pre_tasks {
            if let Err(e) = task.stage.open(&self.context).await {
                warn!(stage = %task.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        for task in &mut self.post_tasks {
            if let Err(e) = task.stage.open(&self.context).await {
                warn!(stage = %task.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        if let Some(reader) = &mut self.reader {
            if let Err(e) = reader.stage.open(&self.context).await {
                warn!(stage = %reader.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        for validator in &mut self.validators {
            if let Err(e) = validator.stage.open(&self.context).await {
                warn!(stage = %validator.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        for transform in &mut self.transforms {
            if let Err(e) = transform.stage.open(&self.context).await {
                warn!(stage = %transform.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        for writer in &mut self.writers {
            if let Err(e) = writer.stage.open(&self.context).await {
                warn!(stage = %writer.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }
        for listener in &mut self.listeners {
            if let Err(e) = listener.stage.open(&self.context).await {
                warn!(stage = %listener.name, "open failed: {e}");
                self.context.fail(e.to_string());
            }
        }

        self.state = EngineState::Opened;
        self.context.set_state("opened");
        if self.context.is_in_error() {
            notify_error(&mut self.listeners, &self.context, &mut self.error_notified).await;
        } else {
            info!(job = %self.context.name(), id = %self.context.id(), "engine opened");
        }
    }

    /// Pumps the transaction loop until end of stream, a final record, or
    /// the error flag.
    pub async fn run(&mut self) {
        if self.state != EngineState::Opened {
            warn!(job = %self.context.name(), state = ?self.state, "run ignored");
            return;
        }
        if self.context.is_in_error() {
            warn!(job = %self.context.name(), "run skipped, context in error");
            return;
        }
        self.state = EngineState::Running;
        self.context.set_state("running");

        let Self {
            context,
            reader,
            validators,
            transforms,
            writers,
            listeners,
            pre_tasks,
            error_notified,
            ..
        } = self;

        for task in pre_tasks.iter_mut() {
            if let Err(e) = task.stage.execute(context).await {
                if task.stage.halt_on_error() {
                    context.fail(format!("task '{}' failed: {e}", task.name));
                    break;
                }
                warn!(stage = %task.name, "task failed (continuing): {e}");
            }
        }

        if !context.is_in_error() {
            if let Some(reader) = reader.as_mut() {
                let mut row: u64 = 0;
                loop {
                    row += 1;
                    let mut tx = TransactionContext::new(Arc::clone(context), row);

                    let record = match reader.stage.read(&mut tx).await {
                        Ok(Some(record)) => record,
                        Ok(None) => break,
                        Err(e) => {
                            context.fail(format!("reader '{}' failed: {e}", reader.name));
                            break;
                        }
                    };
                    tx.set_source(record.clone());
                    // The working copy starts as the source; transforms take
                    // it from there.
                    tx.set_target(record);

                    for listener in listeners.iter_mut() {
                        listener.stage.on_read(&tx).await;
                    }

                    let mut record_ok = true;
                    for validator in validators.iter_mut() {
                        match validator.stage.validate(&tx).await {
                            Ok(true) => {}
                            Ok(false) => {
                                for listener in listeners.iter_mut() {
                                    listener
                                        .stage
                                        .on_validation_failed(
                                            &tx,
                                            &validator.name,
                                            validator.stage.description(),
                                        )
                                        .await;
                                }
                                if validator.stage.halt_on_fail() {
                                    context.fail(format!(
                                        "validator '{}' rejected row {} (field '{}'): {}",
                                        validator.name,
                                        row,
                                        validator.stage.field(),
                                        validator.stage.description()
                                    ));
                                    record_ok = false;
                                    break;
                                }
                                debug!(
                                    validator = %validator.name,
                                    row,
                                    "validation failed (continuing)"
                                );
                            }
                            Err(e) => {
                                context.fail(format!("validator '{}' failed: {e}", validator.name));
                                record_ok = false;
                                break;
                            }
                        }
                    }

                    if record_ok && !context.is_in_error() {
                        for transform in transforms.iter_mut() {
                            if let Err(e) = transform.stage.transform(&mut tx).await {
                                context.fail(format!("transform '{}' failed: {e}", transform.name));
                                record_ok = false;
                                break;
                            }
                        }
                    }

                    if record_ok && !context.is_in_error() {
                        for writer in writers.iter_mut() {
                            if let Some(condition) = writer.stage.condition() {
                                if !condition.evaluate(tx.target()) {
                                    debug!(writer = %writer.name, row, "condition dropped record");
                                    continue;
                                }
                            }
                            if let Err(e) = writer.stage.write(&tx).await {
                                context.fail(format!("writer '{}' failed: {e}", writer.name));
                                record_ok = false;
                                break;
                            }
                        }
                    }

                    if record_ok && !context.is_in_error() {
                        for listener in listeners.iter_mut() {
                            listener.stage.on_write(&tx).await;
                        }
                        context.record_frame();
                    }

                    if context.is_in_error() {
                        break;
                    }
                    if tx.is_last_frame() {
                        debug!(job = %context.name(), row, "final record processed");
                        break;
                    }
                }
            }
        }

        if context.is_in_error() {
            notify_error(listeners, context, error_notified).await;
        }
        info!(
            job = %context.name(),
            frames = context.frames_processed(),
            error = context.is_in_error(),
            "run finished"
        );
    }

    /// Runs post-process tasks, closes every stage in reverse-of-open order
    /// and finalizes the context. Idempotent and callable from any state.
    pub async fn close(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }
        let was_opened = self.state != EngineState::New;
        self.state = EngineState::Closed;
        self.context.set_state("closing");

        if was_opened {
            for task in &mut self.post_tasks {
                if let Err(e) = task.stage.execute(&self.context).await {
                    if task.stage.halt_on_error() {
                        self.context.fail(format!("task '{}' failed: {e}", task.name));
                    } else {
                        warn!(stage = %task.name, "task failed (continuing): {e}");
                    }
                }
            }
        }

        if self.context.is_in_error() {
            notify_error(&mut self.listeners, &self.context, &mut self.error_notified).await;
        }

        for listener in self.listeners.iter_mut().rev() {
            listener.stage.close().await;
        }
        for writer in self.writers.iter_mut().rev() {
            writer.stage.close().await;
        }
        for transform in self.transforms.iter_mut().rev() {
            transform.stage.close().await;
        }
        for validator in self.validators.iter_mut().rev() {
            validator.stage.close().await;
        }
        if let Some(reader) = &mut self.reader {
            reader.stage.close().await;
        }
        for task in self.post_tasks.iter_mut().rev() {
            task.stage.close().await;
        }
        for task in self.pre_tasks.iter_mut().rev() {
            task.stage.close().await;
        }

        if let Some(store) = self.context.take_store() {
            if let Err(e) = store.flush() {
                warn!(job = %self.context.name(), "context store flush failed: {e}");
            }
        }
        self.context.mark_ended();
        let errored = self.context.is_in_error();
        self.context
            .set_state(if errored { "errored" } else { "closed" });
        info!(job = %self.context.name(), error = errored, "engine closed");
    }

    /// Open, run and close in one call, returning the final context status.
    pub async fn execute(&mut self) -> ContextStatus {
        self.open().await;
        self.run().await;
        self.close().await;
        self.context.status()
    }
}

async fn notify_error(
    listeners: &mut [Slot<dyn ContextListener>],
    context: &Arc<JobContext>,
    notified: &mut bool,
) {
    if *notified {
        return;
    }
    *notified = true;
    for listener in listeners {
        listener.stage.on_error(context).await;
    }
}
