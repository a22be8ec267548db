//! Error types for reconciliation and storage.

use std::error::Error;

use rowsync_formula::FormulaError;
use rowsync_model::{ModelError, RowId};
use thiserror::Error;

use crate::store::Correlation;

/// Failure reported by a storage primitive.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend raised an error while executing the primitive.
    #[error("storage backend failed")]
    Backend {
        /// Primitive name.
        operation: &'static str,
        /// Target table.
        table: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Store refused the request.
    #[error("storage request rejected")]
    Rejected {
        /// Primitive name.
        operation: &'static str,
        /// Target table.
        table: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
        /// Row involved, when known.
        id: Option<RowId>,
    },
}

/// Convenience alias for storage results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Primary error type for reconciliation runs.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A submitted filter failed validation; nothing was written.
    #[error("filter validation failed")]
    InvalidFilter {
        /// Location of the filter in the submitted tree.
        path: String,
        /// Validation failure.
        #[source]
        source: FormulaError,
    },
    /// A row carried a filter although its kind has none.
    #[error("row kind does not carry a filter")]
    UnexpectedFilter {
        /// Table of the offending rows.
        table: &'static str,
    },
    /// A row carried a child collection its kind does not nest.
    #[error("row kind does not nest this child collection")]
    UnexpectedChildren {
        /// Table of the offending rows.
        table: &'static str,
        /// Label of the unexpected collection.
        child: &'static str,
    },
    /// A storage primitive failed.
    #[error("storage operation failed")]
    Store {
        /// Underlying storage failure.
        #[from]
        source: StoreError,
    },
    /// Insert returned without an id for a submitted row.
    #[error("insert returned no id for a submitted row")]
    MissingGeneratedId {
        /// Target table.
        table: &'static str,
        /// Token of the unresolved row.
        token: Correlation,
    },
    /// Insert returned a token that was not submitted or was returned twice.
    #[error("insert returned an unexpected correlation token")]
    UnknownCorrelation {
        /// Target table.
        table: &'static str,
        /// Offending token.
        token: Correlation,
    },
    /// Stored row required an id but had none.
    #[error("stored row has no id")]
    MissingRowId {
        /// Table of the row.
        table: &'static str,
        /// Position of the row in its list.
        index: usize,
    },
    /// Stored row could not be decoded.
    #[error("stored row could not be decoded")]
    Decode {
        /// Table of the row.
        table: &'static str,
        /// Row identifier.
        id: RowId,
        /// Decoding failure.
        #[source]
        source: ModelError,
    },
}

/// Convenience alias for reconciliation results.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
