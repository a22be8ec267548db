//! Default values and accepted ranges for engine settings.

/// Rows per insert call.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;
/// Ids per delete call.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;
/// Prefix of the temporary value used while swapping unique names.
pub const DEFAULT_RENAME_PREFIX: &str = "#";
/// Log level used when neither the file nor the environment sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Upper bound for either batch size.
pub const MAX_BATCH_SIZE: usize = 10_000;
/// Upper bound for the rename prefix, in characters.
pub const MAX_RENAME_PREFIX_CHARS: usize = 8;
