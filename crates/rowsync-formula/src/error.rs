//! Error types for formula parsing and validation.

use rowsync_model::RowId;
use thiserror::Error;

/// Validation failures raised before any persistence happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// Formula was empty or blank.
    #[error("formula is empty")]
    EmptyFormula,
    /// Formula could not be parsed.
    #[error("incorrect formula syntax")]
    MalformedFormula {
        /// Byte offset of the failure.
        position: usize,
        /// Unparsed remainder starting at the failure.
        near: String,
    },
    /// Condition of an expression filter lacks a letter label.
    #[error("condition is missing its formula id")]
    MissingFormulaId {
        /// Position of the condition in the submitted list.
        index: usize,
    },
    /// Two conditions carry the same letter label.
    #[error("duplicate formula id")]
    DuplicateFormulaId {
        /// Repeated label.
        formulaid: String,
    },
    /// Formula references a label no condition carries.
    #[error("formula references an undefined formula id")]
    UndefinedFormulaId {
        /// Label used in the formula.
        formulaid: String,
    },
    /// Condition label is not used by the formula.
    #[error("condition is not referenced by the formula")]
    UnreferencedCondition {
        /// Label carried by the condition.
        formulaid: String,
    },
    /// Number of distinct formula constants differs from the number of conditions.
    #[error("formula constants do not match conditions")]
    ConditionCountMismatch {
        /// Distinct constants in the formula.
        constants: usize,
        /// Submitted conditions.
        conditions: usize,
    },
    /// Letter has no identifier in the supplied mapping.
    #[error("formula id has no mapped condition")]
    UnmappedFormulaId {
        /// Unmapped label.
        formulaid: String,
    },
    /// Identifier has no letter in the supplied mapping.
    #[error("condition id has no mapped formula id")]
    UnmappedConditionId {
        /// Unmapped identifier.
        id: RowId,
    },
    /// Condition needs a stored identifier but has none.
    #[error("condition has no identifier")]
    MissingConditionId {
        /// Position of the condition in the list.
        index: usize,
    },
}

impl FormulaError {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyFormula => "empty_formula",
            Self::MalformedFormula { .. } => "malformed_formula",
            Self::MissingFormulaId { .. } => "missing_formula_id",
            Self::DuplicateFormulaId { .. } => "duplicate_formula_id",
            Self::UndefinedFormulaId { .. } => "undefined_formula_id",
            Self::UnreferencedCondition { .. } => "unreferenced_condition",
            Self::ConditionCountMismatch { .. } => "condition_count_mismatch",
            Self::UnmappedFormulaId { .. } => "unmapped_formula_id",
            Self::UnmappedConditionId { .. } => "unmapped_condition_id",
            Self::MissingConditionId { .. } => "missing_condition_id",
        }
    }
}

/// Convenience alias for formula results.
pub type FormulaResult<T> = Result<T, FormulaError>;
