#![forbid(unsafe_code)]
#![deny(
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Engine settings: typed model, JSON file and environment loading, validation.
//!
//! Layout: `model.rs` (settings structs), `defaults.rs` (default values and
//! limits), `loader.rs` (file + environment layering), `validate.rs` (range
//! and shape checks).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_DELETE_BATCH_SIZE, ENV_INSERT_BATCH_SIZE, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
    ENV_RENAME_PREFIX, load_settings, load_settings_from,
};
pub use model::{EngineSettings, LogOutput, LoggingSettings};
pub use validate::validate_settings;
