//! Dynamic stage resolution.
//!
//! Configuration names stages by a registry key; the registry maps each key
//! to a factory producing a value behind the family's contract trait.
//! Factories are infallible on purpose: a component checks its options in
//! `open`, where the engine can collect every stage's complaint in one pass,
//! so resolution only fails for keys nobody registered. Keys are
//! case-insensitive.
//!
//! The registry is a plain value, not a process-wide singleton. Runners
//! build one (usually starting from [`StageRegistry::with_builtins`]),
//! register their own connectors, and hand it to the engine builder.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::component::{
    ContextListener, FrameReader, FrameTransform, FrameValidator, FrameWriter, TransformTask,
};
use crate::config::{ComponentConfig, StageConfig};
use crate::errors::ConfigurationError;
use crate::listener::LoggingListener;
use crate::task::{LogContextTask, SetSymbolTask};
use crate::transform::{CastTransform, RemoveTransform, RenameTransform, SetTransform};
use crate::validate::{AvoidsValidator, MatchesValidator, NotEmptyValidator};

type ReaderFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn FrameReader> + Send + Sync>;
type ValidatorFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn FrameValidator> + Send + Sync>;
type TransformFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn FrameTransform> + Send + Sync>;
type WriterFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn FrameWriter> + Send + Sync>;
type ListenerFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn ContextListener> + Send + Sync>;
type TaskFactory = Box<dyn Fn(ComponentConfig) -> Box<dyn TransformTask> + Send + Sync>;

/// Maps registry keys to stage factories, one namespace per family.
#[derive(Default)]
pub struct StageRegistry {
    readers: HashMap<String, ReaderFactory>,
    validators: HashMap<String, ValidatorFactory>,
    transforms: HashMap<String, TransformFactory>,
    writers: HashMap<String, WriterFactory>,
    listeners: HashMap<String, ListenerFactory>,
    tasks: HashMap<String, TaskFactory>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in stage registered.
    ///
    /// Built-ins cover validators (`NotEmpty`, `Matches`, `Avoids`),
    /// transforms (`Set`, `Rename`, `Remove`, `Cast`), tasks (`LogContext`,
    /// `SetSymbol`) and the `Logging` listener. Readers and writers are
    /// connectors; the embedding application registers its own.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_validator("NotEmpty", |o| Box::new(NotEmptyValidator::from_config(o)));
        registry.register_validator("Matches", |o| Box::new(MatchesValidator::from_config(o)));
        registry.register_validator("Avoids", |o| Box::new(AvoidsValidator::from_config(o)));
        registry.register_transform("Set", |o| Box::new(SetTransform::from_config(o)));
        registry.register_transform("Rename", |o| Box::new(RenameTransform::from_config(o)));
        registry.register_transform("Remove", |o| Box::new(RemoveTransform::from_config(o)));
        registry.register_transform("Cast", |o| Box::new(CastTransform::from_config(o)));
        registry.register_task("LogContext", |o| Box::new(LogContextTask::from_config(o)));
        registry.register_task("SetSymbol", |o| Box::new(SetSymbolTask::from_config(o)));
        registry.register_listener("Logging", |o| Box::new(LoggingListener::from_config(o)));
        registry
    }

    /// Registers a reader factory under `key`.
    pub fn register_reader<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn FrameReader> + Send + Sync + 'static,
    {
        self.readers
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Registers a validator factory under `key`.
    pub fn register_validator<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn FrameValidator> + Send + Sync + 'static,
    {
        self.validators
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Registers a transform factory under `key`.
    pub fn register_transform<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn FrameTransform> + Send + Sync + 'static,
    {
        self.transforms
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Registers a writer factory under `key`.
    pub fn register_writer<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn FrameWriter> + Send + Sync + 'static,
    {
        self.writers
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Registers a listener factory under `key`.
    pub fn register_listener<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn ContextListener> + Send + Sync + 'static,
    {
        self.listeners
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Registers a task factory under `key`.
    pub fn register_task<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(ComponentConfig) -> Box<dyn TransformTask> + Send + Sync + 'static,
    {
        self.tasks
            .insert(key.into().to_lowercase(), Box::new(factory));
    }

    /// Builds the reader a stage entry names.
    pub fn resolve_reader(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn FrameReader>, ConfigurationError> {
        let factory = self
            .readers
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("reader", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }

    /// Builds the validator a stage entry names.
    pub fn resolve_validator(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn FrameValidator>, ConfigurationError> {
        let factory = self
            .validators
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("validator", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }

    /// Builds the transform a stage entry names.
    pub fn resolve_transform(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn FrameTransform>, ConfigurationError> {
        let factory = self
            .transforms
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("transform", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }

    /// Builds the writer a stage entry names.
    pub fn resolve_writer(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn FrameWriter>, ConfigurationError> {
        let factory = self
            .writers
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("writer", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }

    /// Builds the listener a stage entry names.
    pub fn resolve_listener(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn ContextListener>, ConfigurationError> {
        let factory = self
            .listeners
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("listener", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }

    /// Builds the task a stage entry names.
    pub fn resolve_task(
        &self,
        stage: &StageConfig,
    ) -> Result<Box<dyn TransformTask>, ConfigurationError> {
        let factory = self
            .tasks
            .get(&stage.class.to_lowercase())
            .ok_or_else(|| unknown("task", &stage.class))?;
        Ok(factory(stage.options.clone()))
    }
}

impl Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("readers", &self.readers.len())
            .field("validators", &self.validators.len())
            .field("transforms", &self.transforms.len())
            .field("writers", &self.writers.len())
            .field("listeners", &self.listeners.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

fn unknown(family: &str, class: &str) -> ConfigurationError {
    ConfigurationError::new(family, format!("unknown class '{class}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CollectingWriter, VecReader};

    #[test]
    fn test_builtins_resolve_case_insensitively() {
        let registry = StageRegistry::with_builtins();

        assert!(registry
            .resolve_validator(&StageConfig::new("NotEmpty").with_option("field", "x"))
            .is_ok());
        assert!(registry
            .resolve_validator(&StageConfig::new("notempty").with_option("field", "x"))
            .is_ok());
        assert!(registry
            .resolve_transform(&StageConfig::new("SET"))
            .is_ok());
        assert!(registry.resolve_task(&StageConfig::new("logcontext")).is_ok());
        assert!(registry
            .resolve_listener(&StageConfig::new("Logging"))
            .is_ok());
    }

    #[test]
    fn test_unknown_class_reports_family() {
        let registry = StageRegistry::with_builtins();

        let err = registry
            .resolve_reader(&StageConfig::new("Imaginary"))
            .unwrap_err();
        assert_eq!(err.component, "reader");
        assert!(err.message.contains("Imaginary"));
    }

    #[test]
    fn test_external_registration() {
        let mut registry = StageRegistry::new();
        registry.register_reader("Vec", |o| Box::new(VecReader::from_config(o)));
        registry.register_writer("Collecting", |o| Box::new(CollectingWriter::from_config(o)));

        assert!(registry.resolve_reader(&StageConfig::new("vec")).is_ok());
        assert!(registry
            .resolve_writer(&StageConfig::new("COLLECTING"))
            .is_ok());
        assert!(registry.resolve_writer(&StageConfig::new("vec")).is_err());
    }

    #[test]
    fn test_later_registration_replaces_earlier() {
        let mut registry = StageRegistry::new();
        registry.register_reader("source", |o| Box::new(VecReader::from_config(o)));
        registry.register_reader("SOURCE", |o| Box::new(VecReader::from_config(o)));

        assert!(registry.resolve_reader(&StageConfig::new("Source")).is_ok());
    }
}
