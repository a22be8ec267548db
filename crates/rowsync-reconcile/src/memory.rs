//! In-memory [`Store`] used by tests and dry runs.
//!
//! # Design
//! - Ids are allocated per table from a counter that never moves backwards,
//!   so a deleted id is never handed out again.
//! - Every primitive call is journaled; tests assert on call counts and order.
//! - Optional per-parent unique columns emulate the constraints that make
//!   placeholder renames necessary.

use std::collections::BTreeMap;

use rowsync_model::{Fields, RowId, TableSpec};

use crate::error::{StoreError, StoreResult};
use crate::store::{Correlation, InsertRow, RowUpdate, SelectedRow, Store};

/// Storage primitive kind recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// [`Store::insert`].
    Insert,
    /// [`Store::update`].
    Update,
    /// [`Store::delete`].
    Delete,
    /// [`Store::select`].
    Select,
}

impl StoreOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
        }
    }
}

/// Journal entry for one primitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Primitive called.
    pub op: StoreOp,
    /// Target table.
    pub table: &'static str,
    /// Rows, updates, ids or parent ids submitted.
    pub rows: usize,
}

#[derive(Debug, Default)]
struct MemoryTable {
    last_id: i64,
    rows: BTreeMap<RowId, MemoryRow>,
}

#[derive(Debug, Clone)]
struct MemoryRow {
    parent_id: RowId,
    fields: Fields,
}

/// Map-backed store with a call journal.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<&'static str, MemoryTable>,
    journal: Vec<StoreCall>,
    failures: Vec<(StoreOp, &'static str)>,
    unique: Vec<(&'static str, &'static str)>,
    reverse_insert_results: bool,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce that `column` is unique among siblings of `table`.
    #[must_use]
    pub fn with_unique(mut self, table: &TableSpec, column: &'static str) -> Self {
        self.unique.push((table.name, column));
        self
    }

    /// Report insert results in reverse submission order.
    #[must_use]
    pub const fn with_reversed_insert_results(mut self) -> Self {
        self.reverse_insert_results = true;
        self
    }

    /// Make the next `op` call on `table` fail.
    pub fn fail_next(&mut self, op: StoreOp, table: &TableSpec) {
        self.failures.push((op, table.name));
    }

    /// Add a row without journaling it.
    pub fn seed(&mut self, table: &TableSpec, parent_id: RowId, fields: Fields) -> RowId {
        let entry = self.tables.entry(table.name).or_default();
        entry.last_id += 1;
        let id = RowId::new(entry.last_id);
        entry.rows.insert(id, MemoryRow { parent_id, fields });
        id
    }

    /// Add a row of a root table without journaling it.
    pub fn seed_root(&mut self, table: &TableSpec, fields: Fields) -> RowId {
        self.seed(table, RowId::new(0), fields)
    }

    /// Stored columns of a row.
    #[must_use]
    pub fn fields(&self, table: &TableSpec, id: RowId) -> Option<&Fields> {
        self.tables
            .get(table.name)
            .and_then(|t| t.rows.get(&id))
            .map(|row| &row.fields)
    }

    /// Every row of `table`, ordered by id.
    #[must_use]
    pub fn rows(&self, table: &TableSpec) -> Vec<SelectedRow> {
        self.tables
            .get(table.name)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(id, row)| SelectedRow {
                        id: *id,
                        parent_id: row.parent_id,
                        fields: row.fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Calls made so far.
    #[must_use]
    pub fn journal(&self) -> &[StoreCall] {
        &self.journal
    }

    /// Forget journaled calls.
    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Number of journaled insert, update and delete calls.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.journal
            .iter()
            .filter(|call| call.op != StoreOp::Select)
            .count()
    }

    fn enter(&mut self, op: StoreOp, table: &TableSpec, rows: usize) -> StoreResult<()> {
        self.journal.push(StoreCall {
            op,
            table: table.name,
            rows,
        });
        if let Some(position) = self
            .failures
            .iter()
            .position(|(failing, name)| *failing == op && *name == table.name)
        {
            self.failures.remove(position);
            return Err(StoreError::Rejected {
                operation: op.name(),
                table: table.name,
                reason: "injected failure",
                id: None,
            });
        }
        Ok(())
    }

    fn check_unique(&self, op: StoreOp, table: &TableSpec, id: RowId) -> StoreResult<()> {
        let Some(stored) = self.tables.get(table.name) else {
            return Ok(());
        };
        let Some(row) = stored.rows.get(&id) else {
            return Ok(());
        };
        for (_, column) in self.unique.iter().filter(|(name, _)| *name == table.name) {
            let Some(value) = row.fields.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = stored.rows.iter().any(|(other_id, other)| {
                *other_id != id
                    && other.parent_id == row.parent_id
                    && other.fields.get(*column) == Some(value)
            });
            if clash {
                return Err(StoreError::Rejected {
                    operation: op.name(),
                    table: table.name,
                    reason: "unique constraint violated",
                    id: Some(id),
                });
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn insert(
        &mut self,
        table: &TableSpec,
        rows: &[InsertRow],
    ) -> StoreResult<Vec<(Correlation, RowId)>> {
        self.enter(StoreOp::Insert, table, rows.len())?;
        let mut generated = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = self.tables.entry(table.name).or_default();
            entry.last_id += 1;
            let id = RowId::new(entry.last_id);
            entry.rows.insert(
                id,
                MemoryRow {
                    parent_id: row.parent_id,
                    fields: row.fields.clone(),
                },
            );
            self.check_unique(StoreOp::Insert, table, id)?;
            generated.push((row.token, id));
        }
        if self.reverse_insert_results {
            generated.reverse();
        }
        Ok(generated)
    }

    fn update(&mut self, table: &TableSpec, rows: &[RowUpdate]) -> StoreResult<()> {
        self.enter(StoreOp::Update, table, rows.len())?;
        for update in rows {
            let stored = self
                .tables
                .get_mut(table.name)
                .and_then(|t| t.rows.get_mut(&update.id))
                .ok_or(StoreError::Rejected {
                    operation: "update",
                    table: table.name,
                    reason: "row not found",
                    id: Some(update.id),
                })?;
            for (column, value) in &update.values {
                stored.fields.insert(column.clone(), value.clone());
            }
            self.check_unique(StoreOp::Update, table, update.id)?;
        }
        Ok(())
    }

    fn delete(&mut self, table: &TableSpec, ids: &[RowId]) -> StoreResult<()> {
        self.enter(StoreOp::Delete, table, ids.len())?;
        if let Some(stored) = self.tables.get_mut(table.name) {
            for id in ids {
                stored.rows.remove(id);
            }
        }
        Ok(())
    }

    fn select(&mut self, table: &TableSpec, parent_ids: &[RowId]) -> StoreResult<Vec<SelectedRow>> {
        self.enter(StoreOp::Select, table, parent_ids.len())?;
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| parent_ids.contains(&row.parent_id))
            .collect())
    }
}
