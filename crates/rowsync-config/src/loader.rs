//! Layered settings loading: defaults, then an optional JSON file, then the environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{EngineSettings, LogOutput};
use crate::validate::validate_settings;

/// Overrides [`EngineSettings::insert_batch_size`].
pub const ENV_INSERT_BATCH_SIZE: &str = "ROWSYNC_INSERT_BATCH_SIZE";
/// Overrides [`EngineSettings::delete_batch_size`].
pub const ENV_DELETE_BATCH_SIZE: &str = "ROWSYNC_DELETE_BATCH_SIZE";
/// Overrides [`EngineSettings::rename_placeholder_prefix`].
pub const ENV_RENAME_PREFIX: &str = "ROWSYNC_RENAME_PREFIX";
/// Overrides the logging level.
pub const ENV_LOG_LEVEL: &str = "ROWSYNC_LOG_LEVEL";
/// Overrides the logging format (`json` or `pretty`).
pub const ENV_LOG_FORMAT: &str = "ROWSYNC_LOG_FORMAT";

/// Load settings using the process environment.
///
/// # Errors
///
/// See [`load_settings_from`].
pub fn load_settings(path: Option<&Path>) -> ConfigResult<EngineSettings> {
    let env: BTreeMap<String, String> = std::env::vars().collect();
    load_settings_from(path, &env)
}

/// Load settings from an optional JSON file and an explicit environment map.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Json`] when the file cannot
/// be read or decoded, and [`ConfigError::InvalidField`] when an override or
/// the layered result is invalid.
pub fn load_settings_from(
    path: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> ConfigResult<EngineSettings> {
    let mut settings = match path {
        Some(path) => read_file(path)?,
        None => EngineSettings::default(),
    };
    apply_env(&mut settings, env)?;
    validate_settings(&settings)?;
    debug!(
        insert_batch_size = settings.insert_batch_size,
        delete_batch_size = settings.delete_batch_size,
        "engine settings loaded"
    );
    Ok(settings)
}

fn read_file(path: &Path) -> ConfigResult<EngineSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "read_settings",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env(settings: &mut EngineSettings, env: &BTreeMap<String, String>) -> ConfigResult<()> {
    if let Some(value) = env.get(ENV_INSERT_BATCH_SIZE) {
        settings.insert_batch_size = parse_size("insert_batch_size", value)?;
    }
    if let Some(value) = env.get(ENV_DELETE_BATCH_SIZE) {
        settings.delete_batch_size = parse_size("delete_batch_size", value)?;
    }
    if let Some(value) = env.get(ENV_RENAME_PREFIX) {
        settings.rename_placeholder_prefix.clone_from(value);
    }
    if let Some(value) = env.get(ENV_LOG_LEVEL) {
        settings.logging.level.clone_from(value);
    }
    if let Some(value) = env.get(ENV_LOG_FORMAT) {
        let format = LogOutput::parse(value.trim()).ok_or_else(|| ConfigError::InvalidField {
            field: "logging.format",
            value: Some(value.clone()),
            reason: "must be json or pretty",
        })?;
        settings.logging.format = Some(format);
    }
    Ok(())
}

fn parse_size(field: &'static str, value: &str) -> ConfigResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidField {
            field,
            value: Some(value.to_owned()),
            reason: "must be a positive integer",
        })
}
