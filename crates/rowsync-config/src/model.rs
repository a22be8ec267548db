//! Typed engine settings.
//!
//! # Design
//! - Every field has a default so an empty document is a valid configuration.
//! - Unknown keys are rejected to surface typos early.

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_DELETE_BATCH_SIZE, DEFAULT_INSERT_BATCH_SIZE, DEFAULT_LOG_LEVEL, DEFAULT_RENAME_PREFIX,
};

/// Settings consumed by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Maximum rows submitted per insert call.
    pub insert_batch_size: usize,
    /// Maximum ids submitted per delete call.
    pub delete_batch_size: usize,
    /// Prefix for temporary values written while swapping unique names.
    pub rename_placeholder_prefix: String,
    /// Logging output settings.
    pub logging: LoggingSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            rename_placeholder_prefix: DEFAULT_RENAME_PREFIX.to_owned(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format; inferred from the build profile when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogOutput>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_owned(),
            format: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

impl LogOutput {
    /// Parse the lowercase format name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}
