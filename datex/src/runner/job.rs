//! One-shot job execution.

use std::sync::Arc;

use tracing::info;

use crate::config::JobConfig;
use crate::context::ContextStatus;
use crate::engine::{EngineBuilder, TransformEngine};
use crate::errors::ConfigurationError;
use crate::registry::StageRegistry;

use super::JobDirectories;

/// The final state of a completed run.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    status: ContextStatus,
}

impl JobOutcome {
    pub(crate) fn new(status: ContextStatus) -> Self {
        Self { status }
    }

    /// The final context snapshot.
    #[must_use]
    pub fn status(&self) -> &ContextStatus {
        &self.status
    }

    /// True when the run finished without raising the error flag.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.status.error
    }

    /// The failure description, if the run failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.status.message.as_deref()
    }

    /// Process exit code: zero on success, one on failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.status.error)
    }

    /// Unwraps the final context snapshot.
    #[must_use]
    pub fn into_status(self) -> ContextStatus {
        self.status
    }
}

/// Runs single jobs: a registry, directory settings, and nothing held
/// between runs.
#[derive(Debug, Clone)]
pub struct JobRunner {
    registry: Arc<StageRegistry>,
    dirs: JobDirectories,
}

impl JobRunner {
    /// Creates a runner over a registry, with directories resolved from the
    /// current environment.
    #[must_use]
    pub fn new(registry: StageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            dirs: JobDirectories::default(),
        }
    }

    /// Uses explicitly resolved directories.
    #[must_use]
    pub fn with_directories(mut self, dirs: JobDirectories) -> Self {
        self.dirs = dirs;
        self
    }

    /// The stage registry jobs resolve against.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// The directories runs execute in.
    #[must_use]
    pub fn directories(&self) -> &JobDirectories {
        &self.dirs
    }

    /// Assembles an engine for a job without running it.
    ///
    /// Directory symbols are seeded and a relative persistent-store target is
    /// anchored to the work directory.
    pub fn prepare(&self, config: &JobConfig) -> Result<TransformEngine, ConfigurationError> {
        let builder = EngineBuilder::from_config(config, &self.registry)?;
        let mut builder = self.dirs.seed(builder, &config.name);
        let anchored = builder
            .store_path()
            .filter(|path| path.is_relative())
            .map(|path| self.dirs.work().join(path));
        if let Some(path) = anchored {
            builder = builder.store(path);
        }
        Ok(builder.build())
    }

    /// Runs one job to completion.
    pub async fn run(&self, config: &JobConfig) -> Result<JobOutcome, ConfigurationError> {
        let mut engine = self.prepare(config)?;
        info!(job = %config.name, "job starting");
        let status = engine.execute().await;
        Ok(JobOutcome::new(status))
    }
}
