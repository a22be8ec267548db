//! Loading stored trees through [`Store::select`].
//!
//! # Design
//! - Every requested parent gets an entry, empty when it owns no rows, and
//!   every loaded row carries each of its nested collections, so the result
//!   can be handed to the engine as the full existing state.
//! - Filter owners have their `evaltype` and `formula` columns lifted out of
//!   the row fields into a [`StoredFilter`].

use std::collections::BTreeMap;

use rowsync_model::{
    ChildKind, Condition, EvalType, FieldValue, FilterOwner, ModelError, RowId, StoredFilter,
    StoredRow, text_field,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::store::Store;

/// Load the stored `kind` rows owned by `parent_ids`, recursively.
///
/// # Errors
///
/// Propagates storage failures and returns [`ReconcileError::Decode`] for rows
/// whose filter columns cannot be decoded.
pub fn load_existing<S: Store + ?Sized>(
    store: &mut S,
    kind: ChildKind,
    parent_ids: &[RowId],
) -> ReconcileResult<BTreeMap<RowId, Vec<StoredRow>>> {
    let table = kind.table();
    let selected = store.select(table, parent_ids)?;
    let ids: Vec<RowId> = selected.iter().map(|row| row.id).collect();

    let mut conditions = match kind.filter_owner() {
        Some(owner) if !ids.is_empty() => load_conditions(store, owner, &ids)?,
        _ => BTreeMap::new(),
    };
    let mut nested = Vec::with_capacity(kind.nested().len());
    for &child in kind.nested() {
        let loaded = if ids.is_empty() {
            BTreeMap::new()
        } else {
            load_existing(store, child, &ids)?
        };
        nested.push((child, loaded));
    }

    let mut grouped: BTreeMap<RowId, Vec<StoredRow>> = parent_ids
        .iter()
        .map(|parent_id| (*parent_id, Vec::new()))
        .collect();
    for row in selected {
        let mut stored = StoredRow::new(row.id, row.fields);
        if kind.filter_owner().is_some() {
            let filter = lift_filter(&mut stored, conditions.remove(&row.id).unwrap_or_default())
                .map_err(|source| ReconcileError::Decode {
                    table: table.name,
                    id: row.id,
                    source,
                })?;
            stored = stored.with_filter(filter);
        }
        for (child, loaded) in &mut nested {
            let children = loaded.remove(&row.id).unwrap_or_default();
            stored = stored.with_children(*child, children);
        }
        grouped.entry(row.parent_id).or_default().push(stored);
    }
    Ok(grouped)
}

/// Load the stored conditions of filter owners, keyed by owner id.
///
/// # Errors
///
/// Propagates storage failures and returns [`ReconcileError::Decode`] for
/// condition rows that cannot be decoded.
pub fn load_conditions<S: Store + ?Sized>(
    store: &mut S,
    owner: FilterOwner,
    owner_ids: &[RowId],
) -> ReconcileResult<BTreeMap<RowId, Vec<Condition>>> {
    let table = owner.condition_kind().table();
    let mut grouped: BTreeMap<RowId, Vec<Condition>> = BTreeMap::new();
    for row in store.select(table, owner_ids)? {
        let condition =
            Condition::from_fields(Some(row.id), &row.fields).map_err(|source| {
                ReconcileError::Decode {
                    table: table.name,
                    id: row.id,
                    source,
                }
            })?;
        grouped.entry(row.parent_id).or_default().push(condition);
    }
    Ok(grouped)
}

fn lift_filter(row: &mut StoredRow, conditions: Vec<Condition>) -> Result<StoredFilter, ModelError> {
    let evaltype = match row.fields.remove(FilterOwner::EVALTYPE_COLUMN) {
        None | Some(FieldValue::Null) => EvalType::AndOr,
        Some(FieldValue::Int(code)) => EvalType::try_from(code)?,
        Some(FieldValue::Text(_)) => {
            return Err(ModelError::InvalidFieldType {
                field: FilterOwner::EVALTYPE_COLUMN,
                expected: "integer",
            });
        }
    };
    let formula = text_field(&row.fields, FilterOwner::FORMULA_COLUMN)?;
    row.fields.remove(FilterOwner::FORMULA_COLUMN);
    Ok(StoredFilter {
        evaltype,
        formula,
        conditions,
    })
}

#[cfg(test)]
mod tests {
    use rowsync_model::{ConditionType, fields};

    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn overrides_lift_filters_and_nest_operations() -> ReconcileResult<()> {
        let mut store = MemoryStore::new();
        let rule = RowId::new(40);
        let overrides = ChildKind::Override.table();
        let first = store.seed(
            overrides,
            rule,
            fields! { "step" => 1, "name" => "a", "evaltype" => 3, "formula" => "{1}" },
        );
        store.seed(
            ChildKind::Condition(FilterOwner::Override).table(),
            first,
            Condition::new(ConditionType::new(1), "x").to_fields(),
        );
        store.seed(
            ChildKind::OverrideOperation.table(),
            first,
            fields! { "operationobject" => 0, "operator" => 0, "value" => "" },
        );

        let loaded = load_existing(&mut store, ChildKind::Override, &[rule, RowId::new(41)])?;
        assert_eq!(loaded.get(&RowId::new(41)).map(Vec::len), Some(0));
        let rows = &loaded[&rule];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, fields! { "step" => 1, "name" => "a" });
        let filter = rows[0].filter.as_ref().expect("filter");
        assert_eq!(filter.evaltype, EvalType::Expression);
        assert_eq!(filter.formula, "{1}");
        assert_eq!(filter.conditions.len(), 1);
        let operations = &rows[0].children[&ChildKind::OverrideOperation];
        assert_eq!(operations.len(), 1);
        assert_eq!(
            operations[0].children.get(&ChildKind::OverrideOpTag),
            Some(&Vec::new())
        );
        Ok(())
    }

    #[test]
    fn bad_evaltype_is_a_decode_error() {
        let mut store = MemoryStore::new();
        let rule = RowId::new(1);
        store.seed(
            ChildKind::Override.table(),
            rule,
            fields! { "step" => 1, "evaltype" => 8 },
        );
        let result = load_existing(&mut store, ChildKind::Override, &[rule]);
        assert!(matches!(
            result,
            Err(ReconcileError::Decode {
                table: "lld_override",
                source: ModelError::UnknownEvalType { code: 8 },
                ..
            })
        ));
    }
}
