//! Filter validation and persistence.
//!
//! # Design
//! - The whole submitted tree is validated before the engine writes anything;
//!   a rejected filter is counted by reason and reported with its location.
//! - Conditions are reconciled like any other child collection, then the
//!   letter formula is rewritten with the resolved ids and stored on the owner
//!   row. Owner columns are only written when they change.
//! - Non-expression filters store an empty formula; their display formula is
//!   regenerated from the conditions.

use std::collections::BTreeMap;

use rowsync_formula::{
    canonical_letters, compute_auto_formula, rewrite_letters_to_ids, validate_filter,
};
use rowsync_model::{
    ChildKind, Condition, EvalType, FieldValue, Fields, Filter, FilterOwner, Row, RowId,
    StoredFilter, StoredRow,
};
use rowsync_telemetry::{WriteOp, record_written, run_span};
use tracing::{debug, warn};

use crate::engine::{Group, Reconciler, SyncedByOwner};
use crate::error::{ReconcileError, ReconcileResult};
use crate::store::{RowUpdate, Store};
use crate::writes::{UpdatedRow, WriteLog};

/// Filter to persist for one owner row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterJob {
    /// Owner row; must already exist.
    pub owner_id: RowId,
    /// Submitted filter.
    pub desired: Filter,
    /// Stored filter, when the owner already had one.
    pub existing: Option<StoredFilter>,
}

/// Filter after persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFilter {
    /// Owner row.
    pub owner_id: RowId,
    /// Submitted filter with condition ids populated; the formula is cleared
    /// unless the evaluation type is an expression.
    pub filter: Filter,
    /// Numeric formula written to the owner row.
    pub stored_formula: String,
    /// Readable formula for every evaluation type.
    pub eval_formula: String,
}

/// Result of persisting a batch of filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFilters {
    /// Filters in job order.
    pub filters: Vec<SyncedFilter>,
    /// Writes executed.
    pub writes: WriteLog,
}

impl<S: Store> Reconciler<S> {
    /// Persist one owner's filter.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidFilter`] before any write when the
    /// filter is invalid; otherwise propagates the first storage failure.
    pub fn sync_filter(
        &mut self,
        owner: FilterOwner,
        job: FilterJob,
    ) -> ReconcileResult<SyncedFilters> {
        self.sync_filters(owner, vec![job])
    }

    /// Persist the filters of several owners of the same type in one pass.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::sync_filter`]. Every job is validated before the
    /// first write.
    pub fn sync_filters(
        &mut self,
        owner: FilterOwner,
        jobs: Vec<FilterJob>,
    ) -> ReconcileResult<SyncedFilters> {
        for job in &jobs {
            let path = format!("{}[{}].filter", owner_label(owner), job.owner_id);
            self.check_filter(&job.desired, path)?;
        }
        let span = run_span(owner_label(owner), jobs.len());
        let _entered = span.enter();
        let mut writes = WriteLog::default();
        let filters = self.run_filters(owner, jobs, &mut writes)?;
        record_written(
            &span,
            writes.inserted_count() + writes.updated_count() + writes.deleted_count(),
        );
        Ok(SyncedFilters { filters, writes })
    }

    pub(crate) fn validate_tree(
        &self,
        kind: ChildKind,
        rows: &[Row],
        path: &str,
    ) -> ReconcileResult<()> {
        let table = kind.table();
        for (index, row) in rows.iter().enumerate() {
            if let Some(filter) = &row.filter {
                if kind.filter_owner().is_none() {
                    return Err(ReconcileError::UnexpectedFilter { table: table.name });
                }
                self.check_filter(filter, format!("{path}[{index}].filter"))?;
            }
            for (child, children) in &row.children {
                if !kind.nested().contains(child) {
                    return Err(ReconcileError::UnexpectedChildren {
                        table: table.name,
                        child: child.label(),
                    });
                }
                self.validate_tree(*child, children, &format!("{path}[{index}].{}", child.label()))?;
            }
        }
        Ok(())
    }

    fn check_filter(&self, filter: &Filter, path: String) -> ReconcileResult<()> {
        validate_filter(filter).map(drop).map_err(|source| {
            self.metrics.inc_formula_rejection(source.reason());
            warn!(path = %path, error = %source, "filter rejected");
            ReconcileError::InvalidFilter { path, source }
        })
    }

    pub(crate) fn run_filters(
        &mut self,
        owner: FilterOwner,
        jobs: Vec<FilterJob>,
        log: &mut WriteLog,
    ) -> ReconcileResult<Vec<SyncedFilter>> {
        let kind = owner.condition_kind();
        let mut groups = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let existing = job
                .existing
                .as_ref()
                .map(|filter| stored_conditions(kind, &filter.conditions))
                .transpose()?
                .unwrap_or_default();
            let desired = job
                .desired
                .conditions
                .iter()
                .map(|condition| Row::new(condition.to_fields()))
                .collect();
            groups.push(Group::new(job.owner_id, desired, existing));
        }
        let resolved = self.run_level(kind, groups, log, &mut SyncedByOwner::new())?;

        let mut synced = Vec::with_capacity(jobs.len());
        let mut owner_updates = Vec::new();
        for (job, rows) in jobs.into_iter().zip(resolved) {
            let FilterJob {
                owner_id,
                desired,
                existing,
            } = job;
            let mut conditions = desired.conditions;
            for (index, (condition, row)) in conditions.iter_mut().zip(&rows).enumerate() {
                condition.id = Some(row.id.ok_or(ReconcileError::MissingRowId {
                    table: kind.table().name,
                    index,
                })?);
            }

            let (formula, stored_formula, eval_formula) = if desired.evaltype.is_expression() {
                let ids: BTreeMap<String, RowId> = conditions
                    .iter()
                    .filter_map(|c| Some((c.formulaid.clone()?, c.id?)))
                    .collect();
                let numeric = rewrite_letters_to_ids(&desired.formula, &ids).map_err(|source| {
                    ReconcileError::InvalidFilter {
                        path: format!("{}[{owner_id}].filter", owner_label(owner)),
                        source,
                    }
                })?;
                (desired.formula.clone(), numeric, desired.formula)
            } else {
                let labels = canonical_letters(&conditions);
                for (condition, label) in conditions.iter_mut().zip(labels) {
                    condition.formulaid = Some(label);
                }
                let eval_formula = compute_auto_formula(desired.evaltype, &conditions);
                (String::new(), String::new(), eval_formula)
            };

            let (stored_evaltype, stored_formula_before) = existing
                .map_or((EvalType::AndOr, String::new()), |filter| (filter.evaltype, filter.formula));
            let mut values = Fields::new();
            let mut previous = Fields::new();
            if stored_evaltype != desired.evaltype {
                values.insert(
                    FilterOwner::EVALTYPE_COLUMN.to_owned(),
                    FieldValue::Int(desired.evaltype.code()),
                );
                previous.insert(
                    FilterOwner::EVALTYPE_COLUMN.to_owned(),
                    FieldValue::Int(stored_evaltype.code()),
                );
            }
            if stored_formula_before != stored_formula {
                values.insert(
                    FilterOwner::FORMULA_COLUMN.to_owned(),
                    FieldValue::Text(stored_formula.clone()),
                );
                previous.insert(
                    FilterOwner::FORMULA_COLUMN.to_owned(),
                    FieldValue::Text(stored_formula_before),
                );
            }
            if !values.is_empty() {
                owner_updates.push(UpdatedRow {
                    id: owner_id,
                    values,
                    previous,
                });
            }

            synced.push(SyncedFilter {
                owner_id,
                filter: Filter {
                    evaltype: desired.evaltype,
                    formula,
                    conditions,
                },
                stored_formula,
                eval_formula,
            });
        }

        if !owner_updates.is_empty() {
            let table = owner.table();
            let updates: Vec<RowUpdate> = owner_updates
                .iter()
                .map(|row| RowUpdate {
                    id: row.id,
                    values: row.values.clone(),
                })
                .collect();
            self.store.update(table, &updates)?;
            self.metrics.record_write(table.name, WriteOp::Update, updates.len());
            debug!(table = table.name, rows = updates.len(), "filter owners updated");
            for row in owner_updates {
                log.record_update(table.name, row);
            }
        }
        Ok(synced)
    }
}

fn owner_label(owner: FilterOwner) -> &'static str {
    match owner {
        FilterOwner::Action => "action",
        FilterOwner::DiscoveryRule => "discovery_rule",
        FilterOwner::Override => "override",
    }
}

fn stored_conditions(kind: ChildKind, conditions: &[Condition]) -> ReconcileResult<Vec<StoredRow>> {
    conditions
        .iter()
        .enumerate()
        .map(|(index, condition)| {
            let id = condition.id.ok_or(ReconcileError::MissingRowId {
                table: kind.table().name,
                index,
            })?;
            Ok(StoredRow::new(id, condition.to_fields()))
        })
        .collect()
}
