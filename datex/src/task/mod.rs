//! Built-in tasks.
//!
//! Tasks run before the reader opens (`preprocess`) or while the engine
//! closes (`postprocess`). A failing task halts the job unless its
//! `haltonerror` option says otherwise.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::component::TransformTask;
use crate::config::ComponentConfig;
use crate::context::JobContext;
use crate::errors::{ConfigurationError, DatexError};

fn parse_halt_on_error(
    component: &str,
    options: &ComponentConfig,
) -> Result<bool, ConfigurationError> {
    Ok(options.get_bool(component, "haltonerror")?.unwrap_or(true))
}

/// Logs a dump of the job context: status line plus every symbol.
#[derive(Debug)]
pub struct LogContextTask {
    options: ComponentConfig,
    halt_on_error: bool,
}

impl LogContextTask {
    /// Creates the task from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            halt_on_error: true,
        }
    }
}

#[async_trait]
impl TransformTask for LogContextTask {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.halt_on_error = parse_halt_on_error("LogContext", &self.options)?;
        Ok(())
    }

    async fn execute(&mut self, ctx: &Arc<JobContext>) -> Result<(), DatexError> {
        let status = ctx.status();
        let mut dump = format!(
            "job '{}' id={} state={} frames={} error={}",
            status.job, status.id, status.state, status.frames_processed, status.error
        );
        if let Some(message) = &status.message {
            let _ = write!(dump, " message={message:?}");
        }
        for (name, value) in ctx.symbols().iter() {
            let _ = write!(dump, "\n  {name} = {value}");
        }
        info!("{dump}");
        Ok(())
    }

    fn halt_on_error(&self) -> bool {
        self.halt_on_error
    }
}

/// Sets one symbol in the job context.
#[derive(Debug)]
pub struct SetSymbolTask {
    options: ComponentConfig,
    symbol: String,
    value: String,
    halt_on_error: bool,
}

impl SetSymbolTask {
    /// Creates the task from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            symbol: String::new(),
            value: String::new(),
            halt_on_error: true,
        }
    }
}

#[async_trait]
impl TransformTask for SetSymbolTask {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.symbol = self.options.require_str("SetSymbol", "symbol")?.to_string();
        let value = self
            .options
            .get("value")
            .ok_or_else(|| ConfigurationError::missing_option("SetSymbol", "value"))?;
        self.value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.halt_on_error = parse_halt_on_error("SetSymbol", &self.options)?;
        Ok(())
    }

    async fn execute(&mut self, ctx: &Arc<JobContext>) -> Result<(), DatexError> {
        ctx.set_symbol(self.symbol.clone(), self.value.clone());
        Ok(())
    }

    fn halt_on_error(&self) -> bool {
        self.halt_on_error
    }
}
