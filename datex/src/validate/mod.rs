//! Built-in validators.
//!
//! Validators share three options: `field` (required), `desc` (failure
//! description, defaulted per validator) and `halt` (fail hard, default
//! false). They judge the source record, so a transform can never mask bad
//! input.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::component::FrameValidator;
use crate::config::ComponentConfig;
use crate::context::{JobContext, TransactionContext};
use crate::errors::{ConfigurationError, DatexError};

/// Parsed options common to every validator.
#[derive(Debug, Default)]
struct CommonOptions {
    field: String,
    description: String,
    halt_on_fail: bool,
}

fn parse_common(
    component: &str,
    options: &ComponentConfig,
    default_description: impl FnOnce(&str) -> String,
) -> Result<CommonOptions, ConfigurationError> {
    let field = options.require_str(component, "field")?.to_string();
    let description = options
        .get_str("desc")
        .map_or_else(|| default_description(&field), str::to_string);
    let halt_on_fail = options.get_bool(component, "halt")?.unwrap_or(false);
    Ok(CommonOptions {
        field,
        description,
        halt_on_fail,
    })
}

fn pattern_option<'a>(options: &'a ComponentConfig, original_name: &str) -> Option<&'a str> {
    options
        .get_str("pattern")
        .or_else(|| options.get_str(original_name))
}

/// Passes when the watched field is present with a non-blank value.
#[derive(Debug, Default)]
pub struct NotEmptyValidator {
    options: ComponentConfig,
    common: CommonOptions,
}

impl NotEmptyValidator {
    /// Creates the validator from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            common: CommonOptions::default(),
        }
    }
}

#[async_trait]
impl FrameValidator for NotEmptyValidator {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.common = parse_common("NotEmpty", &self.options, |field| {
            format!("field '{field}' must not be empty")
        })?;
        Ok(())
    }

    async fn validate(&mut self, tx: &TransactionContext) -> Result<bool, DatexError> {
        Ok(match tx.source().get(&self.common.field) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        })
    }

    fn halt_on_fail(&self) -> bool {
        self.common.halt_on_fail
    }

    fn field(&self) -> &str {
        &self.common.field
    }

    fn description(&self) -> &str {
        &self.common.description
    }
}

/// Passes when the watched field matches a pattern.
///
/// The pattern comes from the `pattern` option; `match` is accepted as an
/// alternate spelling.
#[derive(Debug, Default)]
pub struct MatchesValidator {
    options: ComponentConfig,
    common: CommonOptions,
    pattern: Option<Regex>,
}

impl MatchesValidator {
    /// Creates the validator from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            common: CommonOptions::default(),
            pattern: None,
        }
    }
}

#[async_trait]
impl FrameValidator for MatchesValidator {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.common = parse_common("Matches", &self.options, |field| {
            format!("field '{field}' does not match the expected pattern")
        })?;
        let text = pattern_option(&self.options, "match")
            .ok_or_else(|| ConfigurationError::missing_option("Matches", "pattern"))?;
        let pattern = Regex::new(text).map_err(|e| {
            ConfigurationError::invalid_option("Matches", "pattern", &e.to_string())
        })?;
        self.pattern = Some(pattern);
        Ok(())
    }

    async fn validate(&mut self, tx: &TransactionContext) -> Result<bool, DatexError> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| DatexError::processing("Matches", "validator used before open"))?;
        Ok(tx
            .source()
            .get_display(&self.common.field)
            .is_some_and(|value| pattern.is_match(&value)))
    }

    fn halt_on_fail(&self) -> bool {
        self.common.halt_on_fail
    }

    fn field(&self) -> &str {
        &self.common.field
    }

    fn description(&self) -> &str {
        &self.common.description
    }
}

/// Passes when the watched field does not match a pattern.
///
/// A missing field trivially passes. The pattern comes from the `pattern`
/// option; `avoid` is accepted as an alternate spelling.
#[derive(Debug, Default)]
pub struct AvoidsValidator {
    options: ComponentConfig,
    common: CommonOptions,
    pattern: Option<Regex>,
}

impl AvoidsValidator {
    /// Creates the validator from its options.
    #[must_use]
    pub fn from_config(options: ComponentConfig) -> Self {
        Self {
            options,
            common: CommonOptions::default(),
            pattern: None,
        }
    }
}

#[async_trait]
impl FrameValidator for AvoidsValidator {
    async fn open(&mut self, _ctx: &Arc<JobContext>) -> Result<(), ConfigurationError> {
        self.common = parse_common("Avoids", &self.options, |field| {
            format!("field '{field}' matches a forbidden pattern")
        })?;
        let text = pattern_option(&self.options, "avoid")
            .ok_or_else(|| ConfigurationError::missing_option("Avoids", "pattern"))?;
        let pattern = Regex::new(text).map_err(|e| {
            ConfigurationError::invalid_option("Avoids", "pattern", &e.to_string())
        })?;
        self.pattern = Some(pattern);
        Ok(())
    }

    async fn validate(&mut self, tx: &TransactionContext) -> Result<bool, DatexError> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| DatexError::processing("Avoids", "validator used before open"))?;
        Ok(!tx
            .source()
            .get_display(&self.common.field)
            .is_some_and(|value| pattern.is_match(&value)))
    }

    fn halt_on_fail(&self) -> bool {
        self.common.halt_on_fail
    }

    fn field(&self) -> &str {
        &self.common.field
    }

    fn description(&self) -> &str {
        &self.common.description
    }
}
