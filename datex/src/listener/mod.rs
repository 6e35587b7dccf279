//! Built-in listeners.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::component::ContextListener;
use crate::config::ComponentConfig;
use crate::context::{JobContext, TransactionContext};
use crate::errors::ConfigurationError;

/// A tracing-backed record of context transitions.
///
/// Reads and writes log at debug level so high-volume runs stay quiet under
/// the default filter; validation failures and job errors log at warn and
/// error.
#[derive(Debug, Default)]
pub struct LoggingListener {
    job: String,
}

impl LoggingListener {
    /// Creates the listener. It takes no options.
    #[must_use]
    pub fn from_config(_options: ComponentConfig) -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextListener for LoggingListener {
    async fn open(&mut self, ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.job = ctx.name().to_string();
        info!(job = %self.job, id = %ctx.id(), "job context opened");
        Ok(())
    }

    async fn on_read(&mut self, tx: &TransactionContext) {
        debug!(
            job = %self.job,
            row = tx.row(),
            last_frame = tx.is_last_frame(),
            "record read"
        );
    }

    async fn on_validation_failed(
        &mut self,
        tx: &TransactionContext,
        validator: &str,
        description: &str,
    ) {
        warn!(
            job = %self.job,
            row = tx.row(),
            validator = %validator,
            "validation failed: {description}"
        );
    }

    async fn on_write(&mut self, tx: &TransactionContext) {
        debug!(job = %self.job, row = tx.row(), "record written");
    }

    async fn on_error(&mut self, ctx: &Arc<JobContext>) {
        let message = ctx.error_message().unwrap_or_else(|| "unknown".to_string());
        error!(job = %self.job, "job error: {message}");
    }

    async fn close(&mut self) {
        debug!(job = %self.job, "listener closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_survives_full_cycle() {
        let ctx = Arc::new(JobContext::new("listen-test"));
        let mut listener = LoggingListener::from_config(ComponentConfig::new());
        listener.open(&ctx).await.unwrap();

        let tx = TransactionContext::new(Arc::clone(&ctx), 1);
        listener.on_read(&tx).await;
        listener.on_validation_failed(&tx, "NotEmpty", "field 'x' must not be empty").await;
        listener.on_write(&tx).await;

        ctx.fail("boom");
        listener.on_error(&ctx).await;
        listener.close().await;
    }
}
