//! Range and shape checks for engine settings.

use crate::defaults::{MAX_BATCH_SIZE, MAX_RENAME_PREFIX_CHARS};
use crate::error::{ConfigError, ConfigResult};
use crate::model::EngineSettings;

/// Validate a fully layered settings value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first field out of range.
pub fn validate_settings(settings: &EngineSettings) -> ConfigResult<()> {
    validate_batch_size("insert_batch_size", settings.insert_batch_size)?;
    validate_batch_size("delete_batch_size", settings.delete_batch_size)?;

    let prefix = &settings.rename_placeholder_prefix;
    if prefix.is_empty() {
        return Err(ConfigError::InvalidField {
            field: "rename_placeholder_prefix",
            value: None,
            reason: "must not be empty",
        });
    }
    if prefix.chars().count() > MAX_RENAME_PREFIX_CHARS {
        return Err(ConfigError::InvalidField {
            field: "rename_placeholder_prefix",
            value: Some(prefix.clone()),
            reason: "must be at most 8 characters",
        });
    }

    if settings.logging.level.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: "logging.level",
            value: None,
            reason: "must not be empty",
        });
    }
    Ok(())
}

fn validate_batch_size(field: &'static str, value: usize) -> ConfigResult<()> {
    if (1..=MAX_BATCH_SIZE).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field,
            value: Some(value.to_string()),
            reason: "must be between 1 and 10000",
        })
    }
}
