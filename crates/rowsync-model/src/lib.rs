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

//! Shared row, condition, and child-collection types for the reconciliation engine.
//!
//! Layout: `value.rs` (identifiers and loosely typed column values), `condition.rs`
//! (filter conditions and evaluation types), `row.rs` (desired and stored rows),
//! `kind.rs` (child collection catalogue: tables, business keys, diff policies).

pub mod condition;
pub mod error;
pub mod kind;
pub mod row;
pub mod value;

pub use condition::{Condition, ConditionType, EvalType, Operator};
pub use error::{ModelError, ModelResult};
pub use kind::{BusinessKey, ChildKind, FilterOwner, TableSpec};
pub use row::{Filter, Row, StoredFilter, StoredRow};
pub use value::{FieldValue, Fields, RowId, int_field, text_field};
