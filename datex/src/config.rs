//! Configuration documents for jobs and the service host.
//!
//! A job document names its stages by registry key and hands each stage an
//! ordered option map. Parsing is strict about shape (`class` is required on
//! every stage entry) but lazy about options: components check their own
//! options at `open` time so a single parse surfaces every stage's complaint,
//! not just the first.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConfigurationError;

/// Default listen port for the service control API.
pub const DEFAULT_SERVICE_PORT: u16 = 55290;

/// An ordered option map handed to a component verbatim.
///
/// The typed accessors are the shared option-parsing surface for every
/// component family; they return [`ConfigurationError`] so `open`
/// implementations can forward them with `?`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentConfig {
    options: Map<String, Value>,
}

impl ComponentConfig {
    /// Creates an empty option map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing option map.
    #[must_use]
    pub fn from_map(options: Map<String, Value>) -> Self {
        Self { options }
    }

    /// Sets an option, replacing any existing value.
    pub fn set(&mut self, option: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(option.into(), value.into());
    }

    /// Builder-style option setter.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(option, value);
        self
    }

    /// Returns the raw value of an option.
    #[must_use]
    pub fn get(&self, option: &str) -> Option<&Value> {
        self.options.get(option)
    }

    /// Returns true when the option is present.
    #[must_use]
    pub fn contains(&self, option: &str) -> bool {
        self.options.contains_key(option)
    }

    /// Returns a string option, if present and textual.
    #[must_use]
    pub fn get_str(&self, option: &str) -> Option<&str> {
        self.options.get(option).and_then(Value::as_str)
    }

    /// Returns a string option or a configuration error naming the component.
    pub fn require_str(
        &self,
        component: &str,
        option: &str,
    ) -> Result<&str, ConfigurationError> {
        match self.options.get(option) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(Value::String(_)) => Err(ConfigurationError::invalid_option(
                component, option, "must not be empty",
            )),
            Some(_) => Err(ConfigurationError::invalid_option(
                component, option, "expected a string",
            )),
            None => Err(ConfigurationError::missing_option(component, option)),
        }
    }

    /// Returns a boolean option.
    ///
    /// Accepts JSON booleans and the strings `"true"`/`"false"` in any case,
    /// since hand-written documents use both. Absent options yield `None`.
    pub fn get_bool(
        &self,
        component: &str,
        option: &str,
    ) -> Result<Option<bool>, ConfigurationError> {
        match self.options.get(option) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(ConfigurationError::invalid_option(
                    component, option, "expected true or false",
                )),
            },
            Some(_) => Err(ConfigurationError::invalid_option(
                component, option, "expected true or false",
            )),
        }
    }

    /// Returns an unsigned integer option.
    pub fn get_u64(
        &self,
        component: &str,
        option: &str,
    ) -> Result<Option<u64>, ConfigurationError> {
        match self.options.get(option) {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                ConfigurationError::invalid_option(
                    component,
                    option,
                    "expected an unsigned integer",
                )
            }),
        }
    }

    /// Returns the conditional expression attached to this component, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.get_str("condition")
    }

    /// Iterates options in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.options.iter()
    }
}

/// One stage entry: a registry key plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registry key naming the implementation.
    pub class: String,
    /// Remaining options, handed to the component verbatim.
    #[serde(flatten)]
    pub options: ComponentConfig,
}

impl StageConfig {
    /// Creates a stage entry with no options.
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            options: ComponentConfig::new(),
        }
    }

    /// Builder-style option setter.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.set(option, value);
        self
    }
}

/// Database connection block.
///
/// Credentials may arrive pre-encrypted; this layer only carries them,
/// decryption happens in the connector that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Driver identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Connection URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Plain-text username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Plain-text password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Pre-encrypted username.
    #[serde(rename = "encrypted_username", skip_serializing_if = "Option::is_none")]
    pub encrypted_username: Option<String>,
    /// Pre-encrypted password.
    #[serde(rename = "encrypted_password", skip_serializing_if = "Option::is_none")]
    pub encrypted_password: Option<String>,
}

/// Context block: symbol seeds and cross-run persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Symbols loaded into the job context before any stage opens.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Whether the store survives across runs.
    #[serde(default)]
    pub persistent: bool,
    /// Where the persistent store lives. Relative paths resolve against the
    /// work directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

/// A complete job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name, used for logging and for addressing the job over the
    /// control API.
    pub name: String,
    /// Tasks run before the reader opens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocess: Vec<StageConfig>,
    /// The single record source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader: Option<StageConfig>,
    /// Validators, applied in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<StageConfig>,
    /// Transforms, applied in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<StageConfig>,
    /// One or more record sinks. A single object and an array are both
    /// accepted.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub writer: Vec<StageConfig>,
    /// Observers of context transitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<StageConfig>,
    /// Tasks run while the engine closes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postprocess: Vec<StageConfig>,
    /// Shared database connection details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
    /// Context seeds and persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextConfig>,
}

impl JobConfig {
    /// Creates a named job with no stages.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preprocess: Vec::new(),
            reader: None,
            validate: Vec::new(),
            transform: Vec::new(),
            writer: Vec::new(),
            listeners: Vec::new(),
            postprocess: Vec::new(),
            database: None,
            context: None,
        }
    }

    /// Parses a job document from JSON text and checks its shape.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConfigurationError::new("job", e.to_string()))?;
        config.check_shape()?;
        Ok(config)
    }

    /// Rejects documents the engine cannot run.
    ///
    /// A job with no reader is legal (tasks-only jobs exist), but a job with
    /// writers or validators and no reader has nothing to feed them.
    pub fn check_shape(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::missing_option("job", "name"));
        }
        if self.reader.is_none()
            && !(self.writer.is_empty() && self.validate.is_empty() && self.transform.is_empty())
        {
            return Err(ConfigurationError::new(
                "job",
                "record stages configured without a reader",
            ));
        }
        Ok(())
    }
}

/// One job hosted by the service, optionally on a cron schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJobConfig {
    /// Cron expression; absent means the job only runs when commanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// The job document.
    pub job: JobConfig,
}

/// A service document: a listen port plus the jobs the service hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Control API listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of static content served at the root, if any.
    #[serde(rename = "static", skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// Hosted jobs.
    #[serde(default)]
    pub jobs: Vec<ScheduledJobConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVICE_PORT,
            static_dir: None,
            jobs: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Parses a service document from JSON text.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConfigurationError::new("service", e.to_string()))?;
        for entry in &config.jobs {
            entry.job.check_shape()?;
        }
        Ok(config)
    }
}

fn default_port() -> u16 {
    DEFAULT_SERVICE_PORT
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<StageConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(StageConfig),
        Many(Vec<StageConfig>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(stage) => vec![stage],
        OneOrMany::Many(stages) => stages,
    })
}
