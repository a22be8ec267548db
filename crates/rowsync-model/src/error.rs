//! Error types for model conversions.

use thiserror::Error;

/// Errors raised while converting loosely typed rows into model types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Evaluation type code is not one of the supported values.
    #[error("unknown evaluation type")]
    UnknownEvalType {
        /// Offending code.
        code: i64,
    },
    /// Required column was absent from the row.
    #[error("missing field")]
    MissingField {
        /// Column name.
        field: &'static str,
    },
    /// Column was present but carried the wrong value type.
    #[error("invalid field type")]
    InvalidFieldType {
        /// Column name.
        field: &'static str,
        /// Expected value type.
        expected: &'static str,
    },
}

/// Convenience alias for model conversion results.
pub type ModelResult<T> = Result<T, ModelError>;
