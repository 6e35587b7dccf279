//! Engine assembly, programmatic and configuration-driven.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::component::{
    ContextListener, FrameReader, FrameTransform, FrameValidator, FrameWriter, TransformTask,
};
use crate::config::JobConfig;
use crate::context::JobContext;
use crate::errors::ConfigurationError;
use crate::registry::StageRegistry;

use super::{EngineState, Slot, TransformEngine};

/// Assembles a [`TransformEngine`] stage by stage.
///
/// Stage names are only used in log and error messages; the
/// configuration-driven path uses the registry class as the name.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    name: String,
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
}

impl EngineBuilder {
    /// Starts a builder for a named job.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resolves a job document against a registry.
    ///
    /// Fails only on unknown registry keys or a malformed document shape;
    /// per-stage option problems surface later, at `open`, so one run
    /// reports them all.
    pub fn from_config(
        config: &JobConfig,
        registry: &StageRegistry,
    ) -> Result<Self, ConfigurationError> {
        config.check_shape()?;
        let mut builder = Self::new(&config.name);

        for stage in &config.preprocess {
            builder
                .pre_tasks
                .push(Slot::new(&stage.class, registry.resolve_task(stage)?));
        }
        for stage in &config.postprocess {
            builder
                .post_tasks
                .push(Slot::new(&stage.class, registry.resolve_task(stage)?));
        }
        if let Some(stage) = &config.reader {
            builder.reader = Some(Slot::new(&stage.class, registry.resolve_reader(stage)?));
        }
        for stage in &config.validate {
            builder
                .validators
                .push(Slot::new(&stage.class, registry.resolve_validator(stage)?));
        }
        for stage in &config.transform {
            builder
                .transforms
                .push(Slot::new(&stage.class, registry.resolve_transform(stage)?));
        }
        for stage in &config.writer {
            builder
                .writers
                .push(Slot::new(&stage.class, registry.resolve_writer(stage)?));
        }
        for stage in &config.listeners {
            builder
                .listeners
                .push(Slot::new(&stage.class, registry.resolve_listener(stage)?));
        }

        if let Some(context) = &config.context {
            builder.field_seeds = context.fields.clone();
            if context.persistent {
                let path = context
                    .target
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(format!("{}.ctx", config.name)));
                builder.store_path = Some(path);
            }
        }

        Ok(builder)
    }

    /// Sets the reader.
    #[must_use]
    pub fn reader(mut self, name: impl Into<String>, reader: impl FrameReader + 'static) -> Self {
        self.reader = Some(Slot::new(name, Box::new(reader)));
        self
    }

    /// Appends a validator.
    #[must_use]
    pub fn validator(
        mut self,
        name: impl Into<String>,
        validator: impl FrameValidator + 'static,
    ) -> Self {
        self.validators.push(Slot::new(name, Box::new(validator)));
        self
    }

    /// Appends a transform.
    #[must_use]
    pub fn transform(
        mut self,
        name: impl Into<String>,
        transform: impl FrameTransform + 'static,
    ) -> Self {
        self.transforms.push(Slot::new(name, Box::new(transform)));
        self
    }

    /// Appends a writer.
    #[must_use]
    pub fn writer(mut self, name: impl Into<String>, writer: impl FrameWriter + 'static) -> Self {
        self.writers.push(Slot::new(name, Box::new(writer)));
        self
    }

    /// Appends a listener.
    #[must_use]
    pub fn listener(
        mut self,
        name: impl Into<String>,
        listener: impl ContextListener + 'static,
    ) -> Self {
        self.listeners.push(Slot::new(name, Box::new(listener)));
        self
    }

    /// Appends a pre-process task.
    #[must_use]
    pub fn pre_task(mut self, name: impl Into<String>, task: impl TransformTask + 'static) -> Self {
        self.pre_tasks.push(Slot::new(name, Box::new(task)));
        self
    }

    /// Appends a post-process task.
    #[must_use]
    pub fn post_task(
        mut self,
        name: impl Into<String>,
        task: impl TransformTask + 'static,
    ) -> Self {
        self.post_tasks.push(Slot::new(name, Box::new(task)));
        self
    }

    /// Seeds a symbol into the job context at open.
    #[must_use]
    pub fn symbol(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.symbol_seeds.push((name.into(), value.into()));
        self
    }

    /// Seeds a context field (rendered to a symbol) at open.
    #[must_use]
    pub fn seed_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field_seeds.insert(name.into(), value.into());
        self
    }

    /// Attaches a persistent cross-run store at `path`.
    #[must_use]
    pub fn store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Where the persistent store will live, if one was requested.
    ///
    /// Runners use this to anchor relative paths to the work directory
    /// before building.
    #[must_use]
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Builds the engine with a fresh job context.
    #[must_use]
    pub fn build(self) -> TransformEngine {
        TransformEngine {
            context: Arc::new(JobContext::new(self.name)),
            reader: self.reader,
            validators: self.validators,
            transforms: self.transforms,
            writers: self.writers,
            listeners: self.listeners,
            pre_tasks: self.pre_tasks,
            post_tasks: self.post_tasks,
            symbol_seeds: self.symbol_seeds,
            field_seeds: self.field_seeds,
            store_path: self.store_path,
            state: EngineState::New,
            error_notified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CollectingWriter, VecReader};

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::with_builtins();
        registry.register_reader("Vec", |o| Box::new(VecReader::from_config(o)));
        registry.register_writer("Collecting", |o| Box::new(CollectingWriter::from_config(o)));
        registry
    }

    #[test]
    fn test_from_config_resolves_all_families() {
        let config = JobConfig::parse(
            r#"{
                "name": "assembly",
                "preprocess": [ { "class": "SetSymbol", "symbol": "mode", "value": "full" } ],
                "reader": { "class": "Vec", "records": [ { "id": 1 } ] },
                "validate": [ { "class": "NotEmpty", "field": "id" } ],
                "transform": [ { "class": "Set", "field": "seen", "value": true } ],
                "writer": { "class": "Collecting" },
                "listeners": [ { "class": "Logging" } ],
                "postprocess": [ { "class": "LogContext" } ],
                "context": { "fields": { "region": "emea" }, "persistent": true, "target": "out/assembly.ctx" }
            }"#,
        )
        .unwrap();

        let builder = EngineBuilder::from_config(&config, &registry()).unwrap();
        assert!(builder.reader.is_some());
        assert_eq!(builder.validators.len(), 1);
        assert_eq!(builder.transforms.len(), 1);
        assert_eq!(builder.writers.len(), 1);
        assert_eq!(builder.listeners.len(), 1);
        assert_eq!(builder.pre_tasks.len(), 1);
        assert_eq!(builder.post_tasks.len(), 1);
        assert_eq!(builder.store_path.as_deref(), Some(std::path::Path::new("out/assembly.ctx")));
        assert_eq!(builder.field_seeds.get("region"), Some(&Value::from("emea")));

        let engine = builder.build();
        assert_eq!(engine.state(), EngineState::New);
        assert_eq!(engine.context().name(), "assembly");
    }

    #[test]
    fn test_from_config_rejects_unknown_class() {
        let config = JobConfig::parse(
            r#"{ "name": "bad", "reader": { "class": "NoSuchReader" } }"#,
        )
        .unwrap();

        let err = EngineBuilder::from_config(&config, &registry()).unwrap_err();
        assert_eq!(err.component, "reader");
        assert!(err.message.contains("NoSuchReader"));
    }

    #[test]
    fn test_persistent_context_defaults_target() {
        let config = JobConfig::parse(
            r#"{ "name": "nightly", "context": { "persistent": true } }"#,
        )
        .unwrap();

        let builder = EngineBuilder::from_config(&config, &registry()).unwrap();
        assert_eq!(
            builder.store_path.as_deref(),
            Some(std::path::Path::new("nightly.ctx"))
        );
    }
}
