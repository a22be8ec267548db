//! Error types for the Postgres store.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use rowsync_model::RowId;
use rowsync_reconcile::StoreError;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the Postgres store.
#[derive(Debug)]
pub enum DataError {
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying driver error.
        source: postgres::Error,
    },
    /// The identifier pattern failed to compile.
    PatternCompile {
        /// Underlying regex error.
        source: regex::Error,
    },
    /// A table or column name is not a plain lowercase identifier.
    InvalidIdentifier {
        /// Offending identifier.
        identifier: String,
    },
    /// A selected column has a type the store cannot map onto a field value.
    UnsupportedColumn {
        /// Column name.
        column: String,
        /// Postgres type name.
        type_name: String,
    },
    /// A selected row had no usable value in its id or parent column.
    MissingKey {
        /// Column name.
        column: &'static str,
    },
    /// The table has no parent column to select by.
    NoParentColumn,
    /// The id sequence handed out a different number of values than requested.
    IdReservation {
        /// Ids requested.
        requested: usize,
        /// Ids received.
        received: usize,
    },
    /// An update matched no row.
    RowNotFound {
        /// Row identifier.
        id: RowId,
    },
}

impl DataError {
    /// Convert into the engine's storage error for `operation` on `table`.
    ///
    /// Caller mistakes become [`StoreError::Rejected`]; everything else is
    /// wrapped as a backend failure.
    #[must_use]
    pub fn into_store_error(self, operation: &'static str, table: &'static str) -> StoreError {
        let (reason, id) = match self {
            Self::RowNotFound { id } => ("row not found", Some(id)),
            Self::InvalidIdentifier { .. } => ("invalid identifier", None),
            Self::NoParentColumn => ("table has no parent column", None),
            other => {
                return StoreError::Backend {
                    operation,
                    table,
                    source: Box::new(other),
                };
            }
        };
        StoreError::Rejected {
            operation,
            table,
            reason,
            id,
        }
    }
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::PatternCompile { .. } => formatter.write_str("identifier pattern failed to compile"),
            Self::InvalidIdentifier { .. } => formatter.write_str("invalid sql identifier"),
            Self::UnsupportedColumn { .. } => formatter.write_str("unsupported column type"),
            Self::MissingKey { .. } => formatter.write_str("selected row is missing a key column"),
            Self::NoParentColumn => formatter.write_str("table has no parent column"),
            Self::IdReservation { .. } => formatter.write_str("id reservation returned a short batch"),
            Self::RowNotFound { .. } => formatter.write_str("row not found"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::QueryFailed { source, .. } => Some(source),
            Self::PatternCompile { source } => Some(source),
            Self::InvalidIdentifier { .. }
            | Self::UnsupportedColumn { .. }
            | Self::MissingKey { .. }
            | Self::NoParentColumn
            | Self::IdReservation { .. }
            | Self::RowNotFound { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_display_and_source() {
        let pattern = DataError::PatternCompile {
            source: regex::Regex::new("(").expect_err("unbalanced group"),
        };
        assert_eq!(pattern.to_string(), "identifier pattern failed to compile");
        assert!(pattern.source().is_some());

        let reservation = DataError::IdReservation {
            requested: 3,
            received: 2,
        };
        assert_eq!(
            reservation.to_string(),
            "id reservation returned a short batch"
        );
        assert!(reservation.source().is_none());
    }

    #[test]
    fn caller_mistakes_become_rejections() {
        let err = DataError::RowNotFound { id: RowId::new(9) }.into_store_error("update", "optag");
        match err {
            StoreError::Rejected {
                operation,
                table,
                reason,
                id,
            } => {
                assert_eq!(operation, "update");
                assert_eq!(table, "optag");
                assert_eq!(reason, "row not found");
                assert_eq!(id, Some(RowId::new(9)));
            }
            other => panic!("expected a rejection, got {other:?}"),
        }

        let err = DataError::InvalidIdentifier {
            identifier: "bad name".to_owned(),
        }
        .into_store_error("select", "optag");
        assert!(matches!(
            err,
            StoreError::Rejected {
                reason: "invalid identifier",
                ..
            }
        ));
    }

    #[test]
    fn driver_failures_stay_backend_errors() {
        let err = DataError::IdReservation {
            requested: 2,
            received: 0,
        }
        .into_store_error("insert", "conditions");
        match err {
            StoreError::Backend { source, table, .. } => {
                assert_eq!(table, "conditions");
                assert_eq!(source.to_string(), "id reservation returned a short batch");
            }
            other => panic!("expected a backend error, got {other:?}"),
        }
    }
}
