//! Built-in transformers.
//!
//! Transformers rewrite the working record in place; later transformers see
//! the output of earlier ones. Data that cannot be rewritten as configured
//! (an uncastable value, say) is a processing failure and halts the run,
//! matching how writer faults behave.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::component::FrameTransform;
use crate::config::ComponentConfig;
use crate::context::{JobContext, TransactionContext};
use crate::errors::{ConfigurationError, DatexError};

/// Sets a field to a configured value.
#[derive(Debug)]
pub struct SetTransform {
    options: ComponentConfig,
    field: String,
    value: Value,
}

impl SetTransform {
    /// Creates the transform from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            field: String::new(),
            value: Value::Null,
        }
    }
}

#[async_trait]
impl FrameTransform for SetTransform {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.field = self.options.require_str("Set", "field")?.to_string();
        self.value = self
            .options
            .get("value")
            .cloned()
            .ok_or_else(|| ConfigurationError::missing_option("Set", "value"))?;
        Ok(())
    }

    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError> {
        tx.target_mut().set(self.field.clone(), self.value.clone());
        Ok(())
    }
}

/// Renames a field, keeping its value. A record without the field passes
/// through untouched.
#[derive(Debug)]
pub struct RenameTransform {
    options: ComponentConfig,
    field: String,
    to: String,
}

impl RenameTransform {
    /// Creates the transform from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            field: String::new(),
            to: String::new(),
        }
    }
}

#[async_trait]
impl FrameTransform for RenameTransform {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.field = self.options.require_str("Rename", "field")?.to_string();
        self.to = self.options.require_str("Rename", "to")?.to_string();
        Ok(())
    }

    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError> {
        tx.target_mut().rename(&self.field, self.to.clone());
        Ok(())
    }
}

/// Removes a field. A record without the field passes through untouched.
#[derive(Debug)]
pub struct RemoveTransform {
    options: ComponentConfig,
    field: String,
}

impl RemoveTransform {
    /// Creates the transform from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            field: String::new(),
        }
    }
}

#[async_trait]
impl FrameTransform for RemoveTransform {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.field = self.options.require_str("Remove", "field")?.to_string();
        Ok(())
    }

    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError> {
        tx.target_mut().remove(&self.field);
        Ok(())
    }
}

/// Target types for [`CastTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CastType {
    String,
    Integer,
    Float,
    Boolean,
}

impl CastType {
    fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

/// Coerces a field to a configured type.
///
/// Missing and null fields pass through untouched; a present value that
/// cannot be coerced fails the record's run.
#[derive(Debug)]
pub struct CastTransform {
    options: ComponentConfig,
    field: String,
    cast_type: CastType,
}

impl CastTransform {
    /// Creates the transform from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            field: String::new(),
            cast_type: CastType::String,
        }
    }
}

#[async_trait]
impl FrameTransform for CastTransform {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.field = self.options.require_str("Cast", "field")?.to_string();
        let type_name = self.options.require_str("Cast", "type")?;
        self.cast_type = CastType::parse(type_name).ok_or_else(|| {
            ConfigurationError::invalid_option(
                "Cast",
                "type",
                "expected string, integer, float or boolean",
            )
        })?;
        Ok(())
    }

    async fn transform(&mut self, tx: &mut TransactionContext) -> Result<(), DatexError> {
        let Some(value) = tx.target().get(&self.field).cloned() else {
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        let cast = cast_value(&value, self.cast_type).ok_or_else(|| {
            DatexError::processing(
                "Cast",
                format!(
                    "row {}: cannot cast field '{}' value {} to {:?}",
                    tx.row(),
                    self.field,
                    value,
                    self.cast_type
                ),
            )
        })?;
        tx.target_mut().set(self.field.clone(), cast);
        Ok(())
    }
}

fn cast_value(value: &Value, cast_type: CastType) -> Option<Value> {
    match cast_type {
        CastType::String => Some(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),
        CastType::Integer => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::from(i))
                } else {
                    // Floats cast only when they carry no fraction.
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| Value::from(f as i64))
                }
            }
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        CastType::Float => match value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
            _ => None,
        },
        CastType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
    }
}
