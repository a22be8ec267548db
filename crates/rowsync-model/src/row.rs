//! Desired and stored row trees.
//!
//! # Design
//! - A desired [`Row`] carries only the child collections the caller wants
//!   managed: an absent collection is left untouched, an empty one removes
//!   every stored child.
//! - Filters hang off their owning row rather than living in `children`
//!   because their conditions are reconciled together with the owner's
//!   `evaltype` and `formula` columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, EvalType};
use crate::kind::ChildKind;
use crate::value::{FieldValue, Fields, RowId};

/// Filter submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filter {
    /// How conditions combine.
    #[serde(default)]
    pub evaltype: EvalType,
    /// Letter formula; only meaningful for [`EvalType::Expression`].
    #[serde(default)]
    pub formula: String,
    /// Conditions of the filter.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Filter combining `conditions` with a non-expression evaluation type.
    #[must_use]
    pub const fn new(evaltype: EvalType, conditions: Vec<Condition>) -> Self {
        Self {
            evaltype,
            formula: String::new(),
            conditions,
        }
    }

    /// Filter evaluated through a custom letter formula.
    #[must_use]
    pub fn expression(formula: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            evaltype: EvalType::Expression,
            formula: formula.into(),
            conditions,
        }
    }
}

/// Filter as persisted: numeric formula and conditions with identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredFilter {
    /// How conditions combine.
    pub evaltype: EvalType,
    /// Numeric formula (`{id}` operands); empty unless the evaluation type is an expression.
    pub formula: String,
    /// Stored conditions.
    pub conditions: Vec<Condition>,
}

/// Desired state of one row and the child collections it manages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    /// Identifier; populated after reconciliation.
    pub id: Option<RowId>,
    /// Column values to persist.
    pub fields: Fields,
    /// Managed child collections keyed by kind.
    pub children: BTreeMap<ChildKind, Vec<Self>>,
    /// Filter owned by the row, for kinds that carry one.
    pub filter: Option<Filter>,
}

impl Row {
    /// Row with the given columns and no managed children.
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self {
            id: None,
            fields,
            children: BTreeMap::new(),
            filter: None,
        }
    }

    /// Manage `rows` as the full desired set for `kind`.
    #[must_use]
    pub fn with_children(mut self, kind: ChildKind, rows: Vec<Self>) -> Self {
        self.children.insert(kind, rows);
        self
    }

    /// Attach a filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set one column.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_owned(), value.into());
        self
    }

    /// Managed rows of `kind`, if the collection was supplied.
    #[must_use]
    pub fn children_of(&self, kind: ChildKind) -> Option<&[Self]> {
        self.children.get(&kind).map(Vec::as_slice)
    }
}

/// Persisted row with its stored child collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Primary key.
    pub id: RowId,
    /// Stored column values.
    pub fields: Fields,
    /// Stored child collections keyed by kind.
    pub children: BTreeMap<ChildKind, Vec<Self>>,
    /// Stored filter, for kinds that carry one.
    pub filter: Option<StoredFilter>,
}

impl StoredRow {
    /// Stored row without loaded children.
    #[must_use]
    pub const fn new(id: RowId, fields: Fields) -> Self {
        Self {
            id,
            fields,
            children: BTreeMap::new(),
            filter: None,
        }
    }

    /// Attach loaded children of `kind`.
    #[must_use]
    pub fn with_children(mut self, kind: ChildKind, rows: Vec<Self>) -> Self {
        self.children.insert(kind, rows);
        self
    }

    /// Attach a loaded filter.
    #[must_use]
    pub fn with_filter(mut self, filter: StoredFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Desired row equal to this stored state, children and filter included.
    ///
    /// Letter labels of an expression filter are left unset; callers re-derive
    /// them when they need a submit-ready filter.
    #[must_use]
    pub fn to_desired(&self) -> Row {
        Row {
            id: Some(self.id),
            fields: self.fields.clone(),
            children: self
                .children
                .iter()
                .map(|(kind, rows)| (*kind, rows.iter().map(Self::to_desired).collect()))
                .collect(),
            filter: None,
        }
    }
}
