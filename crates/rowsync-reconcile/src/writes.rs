//! Record of the writes a reconciliation run executed, for audit diffing.

use std::collections::{BTreeMap, BTreeSet};

use rowsync_model::{Fields, RowId};

/// Row created by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedRow {
    /// Generated id.
    pub id: RowId,
    /// Owning row.
    pub parent_id: RowId,
    /// Written columns.
    pub fields: Fields,
}

/// Row changed by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedRow {
    /// Updated row.
    pub id: RowId,
    /// Final values of the changed columns.
    pub values: Fields,
    /// Values of the same columns before the run.
    pub previous: Fields,
}

/// Row removed by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRow {
    /// Removed row.
    pub id: RowId,
    /// Owning row.
    pub parent_id: RowId,
    /// Columns as they were stored.
    pub fields: Fields,
}

/// Writes applied to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableWrites {
    /// Inserted rows in submission order.
    pub inserted: Vec<InsertedRow>,
    /// Updated rows.
    pub updated: Vec<UpdatedRow>,
    /// Deleted rows.
    pub deleted: Vec<DeletedRow>,
}

impl TableWrites {
    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Writes of a whole run, grouped by table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteLog {
    tables: BTreeMap<&'static str, TableWrites>,
    touched: BTreeMap<&'static str, BTreeSet<RowId>>,
}

impl WriteLog {
    /// Whether the run wrote nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableWrites::is_empty)
    }

    /// Writes applied to `table`.
    #[must_use]
    pub fn table(&self, table: &str) -> Option<&TableWrites> {
        self.tables.get(table)
    }

    /// Every table written, in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&'static str, &TableWrites)> {
        self.tables.iter().map(|(name, writes)| (*name, writes))
    }

    /// Parents whose rows in `table` changed.
    #[must_use]
    pub fn touched_parents(&self, table: &str) -> Option<&BTreeSet<RowId>> {
        self.touched.get(table)
    }

    /// Total inserted rows.
    #[must_use]
    pub fn inserted_count(&self) -> usize {
        self.tables.values().map(|t| t.inserted.len()).sum()
    }

    /// Total updated rows.
    #[must_use]
    pub fn updated_count(&self) -> usize {
        self.tables.values().map(|t| t.updated.len()).sum()
    }

    /// Total deleted rows.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.tables.values().map(|t| t.deleted.len()).sum()
    }

    /// Fold another log into this one.
    pub fn merge(&mut self, other: Self) {
        for (name, writes) in other.tables {
            let entry = self.tables.entry(name).or_default();
            entry.inserted.extend(writes.inserted);
            entry.updated.extend(writes.updated);
            entry.deleted.extend(writes.deleted);
        }
        for (name, parents) in other.touched {
            self.touched.entry(name).or_default().extend(parents);
        }
    }

    pub(crate) fn record_insert(&mut self, table: &'static str, row: InsertedRow) {
        self.tables.entry(table).or_default().inserted.push(row);
    }

    pub(crate) fn record_update(&mut self, table: &'static str, row: UpdatedRow) {
        self.tables.entry(table).or_default().updated.push(row);
    }

    pub(crate) fn record_delete(&mut self, table: &'static str, row: DeletedRow) {
        self.tables.entry(table).or_default().deleted.push(row);
    }

    pub(crate) fn touch(&mut self, table: &'static str, parent_id: RowId) {
        self.touched.entry(table).or_default().insert(parent_id);
    }
}
