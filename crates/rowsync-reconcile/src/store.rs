//! Storage primitives consumed by the engine.
//!
//! # Design
//! - Inserts return `(token, id)` pairs so id backfill never depends on the
//!   order a backend reports generated keys in.
//! - Row fields never contain the id or parent columns; those travel as
//!   typed values beside them.

use std::fmt;

use rowsync_model::{Fields, RowId, TableSpec};

use crate::error::StoreResult;

/// Per-run token pairing an inserted row with its generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Correlation(u64);

impl Correlation {
    /// Wrap a raw token.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Row submitted to [`Store::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRow {
    /// Token echoed back with the generated id.
    pub token: Correlation,
    /// Owning row.
    pub parent_id: RowId,
    /// Column values.
    pub fields: Fields,
}

/// Sparse update submitted to [`Store::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    /// Row to update.
    pub id: RowId,
    /// Columns to overwrite.
    pub values: Fields,
}

/// Row returned by [`Store::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRow {
    /// Primary key.
    pub id: RowId,
    /// Owning row.
    pub parent_id: RowId,
    /// Column values.
    pub fields: Fields,
}

/// Transactional storage the engine writes through.
///
/// Implementations run inside a caller-managed transaction; the engine never
/// compensates for a failed call.
pub trait Store {
    /// Insert rows and return the generated id of each submitted token.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] when the backend fails.
    fn insert(
        &mut self,
        table: &TableSpec,
        rows: &[InsertRow],
    ) -> StoreResult<Vec<(Correlation, RowId)>>;

    /// Apply sparse updates in the given order.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] when the backend fails.
    fn update(&mut self, table: &TableSpec, rows: &[RowUpdate]) -> StoreResult<()>;

    /// Delete rows by id.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] when the backend fails.
    fn delete(&mut self, table: &TableSpec, ids: &[RowId]) -> StoreResult<()>;

    /// Read the rows owned by any of `parent_ids`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] when the backend fails.
    fn select(&mut self, table: &TableSpec, parent_ids: &[RowId]) -> StoreResult<Vec<SelectedRow>>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn insert(
        &mut self,
        table: &TableSpec,
        rows: &[InsertRow],
    ) -> StoreResult<Vec<(Correlation, RowId)>> {
        (**self).insert(table, rows)
    }

    fn update(&mut self, table: &TableSpec, rows: &[RowUpdate]) -> StoreResult<()> {
        (**self).update(table, rows)
    }

    fn delete(&mut self, table: &TableSpec, ids: &[RowId]) -> StoreResult<()> {
        (**self).delete(table, ids)
    }

    fn select(&mut self, table: &TableSpec, parent_ids: &[RowId]) -> StoreResult<Vec<SelectedRow>> {
        (**self).select(table, parent_ids)
    }
}
