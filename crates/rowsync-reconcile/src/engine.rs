//! Level-by-level execution of reconciliation plans.
//!
//! # Design
//! - One level is planned and executed for every parent group at once:
//!   deletes, then updates, then inserts. Updates that would collide on a
//!   unique column go out under a placeholder first and get their final value
//!   in a trailing call.
//! - Inserts carry correlation tokens; generated ids are paired back by token,
//!   never by position.
//! - Nested kinds run only after the level above has resolved every id, and
//!   are batched across all parents of that level.
//! - Every filter in the submitted tree is validated before the first write.

use std::collections::BTreeMap;

use rowsync_config::EngineSettings;
use rowsync_model::{ChildKind, FieldValue, Fields, FilterOwner, Row, RowId, StoredRow};
use rowsync_telemetry::{Metrics, WriteOp, record_written, run_span};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::filter::{FilterJob, SyncedFilter};
use crate::plan::{Plan, plan};
use crate::store::{Correlation, InsertRow, RowUpdate, Store};
use crate::writes::{DeletedRow, InsertedRow, UpdatedRow, WriteLog};

/// Desired and stored children of one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Owning row.
    pub parent_id: RowId,
    /// Full desired collection.
    pub desired: Vec<Row>,
    /// Stored collection, carrying the nested collections that should be managed.
    pub existing: Vec<StoredRow>,
}

impl Group {
    /// Group for one parent.
    #[must_use]
    pub const fn new(parent_id: RowId, desired: Vec<Row>, existing: Vec<StoredRow>) -> Self {
        Self {
            parent_id,
            desired,
            existing,
        }
    }
}

/// Persisted filters of filter-bearing rows, keyed by owner type and row.
pub type SyncedByOwner = BTreeMap<(FilterOwner, RowId), SyncedFilter>;

/// Result of reconciling one parent's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Desired rows in submission order with ids populated throughout the tree.
    pub rows: Vec<Row>,
    /// Writes executed.
    pub writes: WriteLog,
    /// Stored and readable formulas of every filter-bearing row in the tree.
    pub filters: SyncedByOwner,
}

/// Result of reconciling several parents' collections together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledGroups {
    /// Resolved rows per group, in group order.
    pub groups: Vec<Vec<Row>>,
    /// Writes executed.
    pub writes: WriteLog,
    /// Stored and readable formulas of every filter-bearing row in the tree.
    pub filters: SyncedByOwner,
}

/// Executes reconciliation runs against a [`Store`].
pub struct Reconciler<S> {
    pub(crate) store: S,
    pub(crate) settings: EngineSettings,
    pub(crate) metrics: Metrics,
}

struct LevelGroup {
    group: Group,
    plan: Plan<Fields>,
}

impl<S: Store> Reconciler<S> {
    /// Engine writing through `store`.
    #[must_use]
    pub const fn new(store: S, settings: EngineSettings, metrics: Metrics) -> Self {
        Self {
            store,
            settings,
            metrics,
        }
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Underlying store, mutably.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Shared metrics handle.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Make the stored `kind` children of `parent_id` match `desired`.
    ///
    /// `existing` must carry every nested collection that `desired` manages.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any write when a filter or child
    /// collection in the tree is invalid; otherwise propagates the first
    /// storage failure.
    pub fn reconcile(
        &mut self,
        kind: ChildKind,
        parent_id: RowId,
        desired: Vec<Row>,
        existing: Vec<StoredRow>,
    ) -> ReconcileResult<Reconciled> {
        let ReconciledGroups {
            mut groups,
            writes,
            filters,
        } = self.reconcile_groups(kind, vec![Group::new(parent_id, desired, existing)])?;
        Ok(Reconciled {
            rows: groups.pop().unwrap_or_default(),
            writes,
            filters,
        })
    }

    /// Reconcile the `kind` collections of several parents in one pass.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::reconcile`].
    pub fn reconcile_groups(
        &mut self,
        kind: ChildKind,
        groups: Vec<Group>,
    ) -> ReconcileResult<ReconciledGroups> {
        for group in &groups {
            self.validate_tree(kind, &group.desired, kind.label())?;
        }

        let span = run_span(kind.label(), groups.len());
        let _entered = span.enter();
        let mut writes = WriteLog::default();
        let mut filters = SyncedByOwner::new();
        let groups = self.run_level(kind, groups, &mut writes, &mut filters)?;
        record_written(
            &span,
            writes.inserted_count() + writes.updated_count() + writes.deleted_count(),
        );
        info!(
            kind = kind.label(),
            inserted = writes.inserted_count(),
            updated = writes.updated_count(),
            deleted = writes.deleted_count(),
            "reconciliation finished"
        );
        Ok(ReconciledGroups {
            groups,
            writes,
            filters,
        })
    }

    pub(crate) fn run_level(
        &mut self,
        kind: ChildKind,
        groups: Vec<Group>,
        log: &mut WriteLog,
        filters: &mut SyncedByOwner,
    ) -> ReconcileResult<Vec<Vec<Row>>> {
        let table = kind.table();
        self.metrics.inc_reconcile_run(kind.label());

        let mut levels = Vec::with_capacity(groups.len());
        for group in groups {
            let plan = plan(
                &group.desired,
                &group.existing,
                |row: &Row| kind.business_key(&row.fields),
                |row: &StoredRow| kind.business_key(&row.fields),
                |desired: &Row, existing: &StoredRow| {
                    let change = kind.diff(&desired.fields, &existing.fields);
                    (!change.is_empty()).then_some(change)
                },
            );
            for &index in &plan.duplicates {
                warn!(
                    table = table.name,
                    parent_id = %group.parent_id,
                    id = %group.existing[index].id,
                    "stored rows share a business key; deleting the later row"
                );
            }
            if !plan.is_empty() {
                log.touch(table.name, group.parent_id);
            }
            levels.push(LevelGroup { group, plan });
        }

        let deleted = self.delete_unmatched(kind, &levels, log)?;
        let updated = self.apply_updates(kind, &levels, log)?;
        let generated = self.insert_unmatched(kind, &levels, log)?;
        debug!(
            kind = kind.label(),
            groups = levels.len(),
            inserted = generated.len(),
            updated,
            deleted,
            "level reconciled"
        );

        let mut resolved = Vec::with_capacity(levels.len());
        let mut matched = Vec::with_capacity(levels.len());
        for (g, LevelGroup { group, plan }) in levels.into_iter().enumerate() {
            let mut existing: Vec<Option<StoredRow>> =
                group.existing.into_iter().map(Some).collect();
            let mut rows = Vec::with_capacity(group.desired.len());
            let mut stored = Vec::with_capacity(group.desired.len());
            for (i, (mut row, found)) in group.desired.into_iter().zip(plan.matches).enumerate() {
                let previous = found.and_then(|index| existing[index].take());
                let id = match &previous {
                    Some(previous) => previous.id,
                    None => generated
                        .get(&(g, i))
                        .copied()
                        .ok_or(ReconcileError::MissingRowId {
                            table: table.name,
                            index: i,
                        })?,
                };
                row.id = Some(id);
                rows.push(row);
                stored.push(previous);
            }
            resolved.push(rows);
            matched.push(stored);
        }

        if let Some(owner) = kind.filter_owner() {
            let mut jobs = Vec::new();
            let mut positions = Vec::new();
            for (g, rows) in resolved.iter_mut().enumerate() {
                for (i, row) in rows.iter_mut().enumerate() {
                    let (Some(filter), Some(owner_id)) = (row.filter.take(), row.id) else {
                        continue;
                    };
                    jobs.push(FilterJob {
                        owner_id,
                        desired: filter,
                        existing: matched[g][i].as_mut().and_then(|s| s.filter.take()),
                    });
                    positions.push((g, i));
                }
            }
            if !jobs.is_empty() {
                let synced = self.run_filters(owner, jobs, log)?;
                for ((g, i), filter) in positions.into_iter().zip(synced) {
                    resolved[g][i].filter = Some(filter.filter.clone());
                    filters.insert((owner, filter.owner_id), filter);
                }
            }
        }

        for &nested in kind.nested() {
            let mut subgroups = Vec::new();
            let mut positions = Vec::new();
            for (g, rows) in resolved.iter_mut().enumerate() {
                for (i, row) in rows.iter_mut().enumerate() {
                    let (Some(desired), Some(parent_id)) = (row.children.remove(&nested), row.id)
                    else {
                        continue;
                    };
                    let existing = matched[g][i]
                        .as_mut()
                        .and_then(|s| s.children.remove(&nested))
                        .unwrap_or_default();
                    subgroups.push(Group::new(parent_id, desired, existing));
                    positions.push((g, i));
                }
            }
            if subgroups.is_empty() {
                continue;
            }
            let children = self.run_level(nested, subgroups, log, filters)?;
            for ((g, i), rows) in positions.into_iter().zip(children) {
                resolved[g][i].children.insert(nested, rows);
            }
        }

        Ok(resolved)
    }

    fn delete_unmatched(
        &mut self,
        kind: ChildKind,
        levels: &[LevelGroup],
        log: &mut WriteLog,
    ) -> ReconcileResult<usize> {
        let table = kind.table();
        let doomed: Vec<(RowId, &StoredRow)> = levels
            .iter()
            .flat_map(|level| {
                level
                    .plan
                    .deletes
                    .iter()
                    .map(move |&index| (level.group.parent_id, &level.group.existing[index]))
            })
            .collect();

        for chunk in doomed.chunks(self.settings.delete_batch_size.max(1)) {
            let ids: Vec<RowId> = chunk.iter().map(|(_, row)| row.id).collect();
            self.store.delete(table, &ids)?;
            self.metrics.record_write(table.name, WriteOp::Delete, ids.len());
            for (parent_id, row) in chunk {
                log.record_delete(
                    table.name,
                    DeletedRow {
                        id: row.id,
                        parent_id: *parent_id,
                        fields: row.fields.clone(),
                    },
                );
            }
        }
        Ok(doomed.len())
    }

    fn apply_updates(
        &mut self,
        kind: ChildKind,
        levels: &[LevelGroup],
        log: &mut WriteLog,
    ) -> ReconcileResult<usize> {
        let table = kind.table();
        let mut first = Vec::new();
        let mut deferred = Vec::new();
        let mut audit = Vec::new();
        for level in levels {
            for (_, index, change) in &level.plan.updates {
                let stored = &level.group.existing[*index];
                let mut values = change.clone();
                if let Some(column) = kind.rename_column()
                    && collides(level, *index, column, change)
                    && let Some(target) = values.remove(column)
                {
                    let placeholder = format!("{}{}", self.settings.rename_placeholder_prefix, stored.id);
                    values.insert(column.to_owned(), FieldValue::Text(placeholder));
                    deferred.push(RowUpdate {
                        id: stored.id,
                        values: Fields::from([(column.to_owned(), target)]),
                    });
                }
                first.push(RowUpdate {
                    id: stored.id,
                    values,
                });
                audit.push(UpdatedRow {
                    id: stored.id,
                    values: change.clone(),
                    previous: change
                        .keys()
                        .map(|column| {
                            let value = stored.fields.get(column).cloned();
                            (column.clone(), value.unwrap_or(FieldValue::Null))
                        })
                        .collect(),
                });
            }
        }

        if !first.is_empty() {
            self.store.update(table, &first)?;
            self.metrics.record_write(table.name, WriteOp::Update, first.len());
        }
        if !deferred.is_empty() {
            debug!(
                table = table.name,
                rows = deferred.len(),
                "writing swapped unique values after their placeholders"
            );
            self.store.update(table, &deferred)?;
            self.metrics
                .record_write(table.name, WriteOp::Update, deferred.len());
        }
        let count = audit.len();
        for row in audit {
            log.record_update(table.name, row);
        }
        Ok(count)
    }

    fn insert_unmatched(
        &mut self,
        kind: ChildKind,
        levels: &[LevelGroup],
        log: &mut WriteLog,
    ) -> ReconcileResult<BTreeMap<(usize, usize), RowId>> {
        let table = kind.table();
        let mut slots = Vec::new();
        let mut pending = Vec::new();
        let mut next_token = 0_u64;
        for (g, level) in levels.iter().enumerate() {
            for &i in &level.plan.inserts {
                slots.push((g, i));
                pending.push(InsertRow {
                    token: Correlation::new(next_token),
                    parent_id: level.group.parent_id,
                    fields: insertable(kind, &level.group.desired[i].fields),
                });
                next_token += 1;
            }
        }

        let size = self.settings.insert_batch_size.max(1);
        let mut generated = BTreeMap::new();
        for (chunk_index, chunk) in pending.chunks(size).enumerate() {
            let start = chunk_index * size;
            let returned = self.store.insert(table, chunk)?;
            self.metrics.record_write(table.name, WriteOp::Insert, chunk.len());

            let mut ids: Vec<Option<RowId>> = vec![None; chunk.len()];
            for (token, id) in returned {
                let offset = usize::try_from(token.get())
                    .ok()
                    .and_then(|position| position.checked_sub(start))
                    .filter(|offset| *offset < chunk.len())
                    .ok_or(ReconcileError::UnknownCorrelation {
                        table: table.name,
                        token,
                    })?;
                if ids[offset].replace(id).is_some() {
                    return Err(ReconcileError::UnknownCorrelation {
                        table: table.name,
                        token,
                    });
                }
            }

            for (offset, (row, id)) in chunk.iter().zip(ids).enumerate() {
                let id = id.ok_or(ReconcileError::MissingGeneratedId {
                    table: table.name,
                    token: row.token,
                })?;
                log.record_insert(
                    table.name,
                    InsertedRow {
                        id,
                        parent_id: row.parent_id,
                        fields: row.fields.clone(),
                    },
                );
                generated.insert(slots[start + offset], id);
            }
        }
        Ok(generated)
    }
}

/// Whether writing `change` to the row at `index` would clash with the current
/// value of `column` on another surviving sibling.
fn collides(level: &LevelGroup, index: usize, column: &str, change: &Fields) -> bool {
    let Some(target) = change.get(column).filter(|value| !value.is_null()) else {
        return false;
    };
    level
        .group
        .existing
        .iter()
        .enumerate()
        .filter(|(other, _)| *other != index && !level.plan.deletes.contains(other))
        .any(|(_, sibling)| sibling.fields.get(column) == Some(target))
}

/// Columns of a desired row that are written on insert.
fn insertable(kind: ChildKind, fields: &Fields) -> Fields {
    let table = kind.table();
    fields
        .iter()
        .filter(|(name, _)| {
            name.as_str() != table.id_column
                && name.as_str() != table.parent_column
                && !kind.is_transient(name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
