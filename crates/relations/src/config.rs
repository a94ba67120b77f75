//! Relation tracking configuration
//!
//! Loaded from environment variables the same way application configuration
//! is loaded elsewhere in elif: typed getters with defaults, then `validate()`.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

const RECLAIM_VAR: &str = "RELATIONS_RECLAIM_COLLECTIBLE_END_POINTS";
const MANDATORY_VAR: &str = "RELATIONS_VALIDATE_MANDATORY_RELATIONS";
const DEPTH_VAR: &str = "RELATIONS_MAX_SUB_TRANSACTION_DEPTH";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
}

/// Settings for a `ClientTransaction` hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct RelationConfig {
    /// Drop unmodified, incomplete virtual end-points that nobody references
    pub reclaim_collectible_end_points: bool,
    /// Refuse root commits that leave mandatory relations unset
    pub validate_mandatory_relations: bool,
    /// Maximum number of nested sub-transactions below the root
    pub max_sub_transaction_depth: usize,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            reclaim_collectible_end_points: true,
            validate_mandatory_relations: true,
            max_sub_transaction_depth: 8,
        }
    }
}

impl RelationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            reclaim_collectible_end_points: get_env_bool(
                RECLAIM_VAR,
                "reclaim_collectible_end_points",
                defaults.reclaim_collectible_end_points,
            )?,
            validate_mandatory_relations: get_env_bool(
                MANDATORY_VAR,
                "validate_mandatory_relations",
                defaults.validate_mandatory_relations,
            )?,
            max_sub_transaction_depth: get_env_usize(
                DEPTH_VAR,
                "max_sub_transaction_depth",
                defaults.max_sub_transaction_depth,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sub_transaction_depth == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_sub_transaction_depth".to_string(),
                reason: "At least one sub-transaction level must be allowed".to_string(),
            });
        }

        Ok(())
    }

    /// Configuration source information for debugging
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        for (field, var) in [
            ("reclaim_collectible_end_points", RECLAIM_VAR),
            ("validate_mandatory_relations", MANDATORY_VAR),
            ("max_sub_transaction_depth", DEPTH_VAR),
        ] {
            let source = if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(field.to_string())
            };
            sources.insert(field.to_string(), source);
        }
        sources
    }
}

fn get_env_bool(key: &str, field: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value,
                expected: "true or false".to_string(),
            }),
        },
        Err(_) => Ok(default),
    }
}

fn get_env_usize(key: &str, field: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            expected: "a non-negative number".to_string(),
        }),
        Err(_) => Ok(default),
    }
}
