//! Engine behaviour against the in-memory store.

use std::collections::BTreeSet;

use anyhow::Result;
use proptest::prelude::*;
use rowsync_config::EngineSettings;
use rowsync_model::{
    ChildKind, Condition, ConditionType, FilterOwner, Operator, Row, RowId, StoredRow, fields,
};
use rowsync_reconcile::{
    Correlation, Group, InsertRow, MemoryStore, ReconcileError, Reconciler, RowUpdate,
    SelectedRow, Store, StoreError, StoreOp, StoreResult, load_existing,
};
use rowsync_telemetry::{Metrics, WriteOp};
use rowsync_test_support::fixtures::{
    command_operation, message, message_operation, operation, override_row, tag,
};

fn engine(store: MemoryStore) -> Reconciler<MemoryStore> {
    engine_with(store, EngineSettings::default())
}

fn engine_with(store: MemoryStore, settings: EngineSettings) -> Reconciler<MemoryStore> {
    Reconciler::new(store, settings, Metrics::new().expect("metrics registry"))
}

fn stored_rows(store: &MemoryStore, kind: ChildKind) -> Vec<StoredRow> {
    store
        .rows(kind.table())
        .into_iter()
        .map(|row| StoredRow::new(row.id, row.fields))
        .collect()
}

#[test]
fn operator_change_updates_the_matched_condition() -> Result<()> {
    let kind = ChildKind::Condition(FilterOwner::Action);
    let mut store = MemoryStore::new();
    let action = RowId::new(1);
    let existing_id = store.seed(
        kind.table(),
        action,
        Condition::new(ConditionType::HOST, "7").to_fields(),
    );
    let existing = stored_rows(&store, kind);
    let desired = Condition::new(ConditionType::HOST, "7").with_operator(Operator::NOT_EQUAL);

    let mut engine = engine(store);
    let result = engine.reconcile(kind, action, vec![Row::new(desired.to_fields())], existing)?;

    assert_eq!(result.writes.inserted_count(), 0);
    assert_eq!(result.writes.deleted_count(), 0);
    let updated = &result.writes.table("conditions").expect("writes").updated;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].id, existing_id);
    assert_eq!(updated[0].values, fields! { "operator" => 1 });
    assert_eq!(updated[0].previous, fields! { "operator" => 0 });
    assert_eq!(result.rows[0].id, Some(existing_id));
    Ok(())
}

#[test]
fn unmatched_existing_condition_is_deleted() -> Result<()> {
    let kind = ChildKind::Condition(FilterOwner::Action);
    let mut store = MemoryStore::new();
    let action = RowId::new(1);
    let kept = store.seed(
        kind.table(),
        action,
        Condition::new(ConditionType::HOST, "7").to_fields(),
    );
    let dropped = store.seed(
        kind.table(),
        action,
        Condition::new(ConditionType::HOST, "8").to_fields(),
    );
    let existing = stored_rows(&store, kind);

    let mut engine = engine(store);
    let desired = vec![Row::new(Condition::new(ConditionType::HOST, "7").to_fields())];
    let result = engine.reconcile(kind, action, desired, existing)?;

    let writes = result.writes.table("conditions").expect("writes");
    assert_eq!(writes.deleted.iter().map(|row| row.id).collect::<Vec<_>>(), vec![dropped]);
    assert!(writes.inserted.is_empty());
    assert!(writes.updated.is_empty());
    assert_eq!(result.rows[0].id, Some(kept));
    assert!(engine.store().fields(kind.table(), dropped).is_none());
    Ok(())
}

#[test]
fn duplicate_stored_keys_keep_the_first_row() -> Result<()> {
    let kind = ChildKind::HostTag;
    let mut store = MemoryStore::new();
    let host = RowId::new(5);
    let first = store.seed(kind.table(), host, fields! { "tag" => "env", "value" => "prod" });
    let second = store.seed(kind.table(), host, fields! { "tag" => "env", "value" => "prod" });
    let existing = stored_rows(&store, kind);

    let mut engine = engine(store);
    let result = engine.reconcile(kind, host, vec![tag("env", "prod")], existing)?;

    assert_eq!(result.rows[0].id, Some(first));
    let deleted: Vec<RowId> = result
        .writes
        .table("host_tag")
        .map(|writes| writes.deleted.iter().map(|row| row.id).collect())
        .unwrap_or_default();
    assert_eq!(deleted, vec![second]);
    Ok(())
}

fn action_tree() -> Vec<Row> {
    vec![
        message_operation(&[7, 8]).with_children(ChildKind::OpTag, vec![tag("team", "ops")]),
        Row::new(fields! { "operationtype" => 1, "recovery" => 0, "esc_period" => "0" })
            .with_children(
                ChildKind::OpCondition,
                vec![Row::new(fields! { "conditiontype" => 14, "operator" => 0, "value" => "1" })],
            ),
    ]
}

#[test]
fn second_run_over_loaded_state_writes_nothing() -> Result<()> {
    let action = RowId::new(3);
    let mut engine = engine(MemoryStore::new());
    let first = engine.reconcile(ChildKind::Operation, action, action_tree(), Vec::new())?;
    assert_eq!(first.writes.inserted_count(), 6);

    let mut existing = load_existing(engine.store_mut(), ChildKind::Operation, &[action])?;
    engine.store_mut().clear_journal();
    let second = engine.reconcile(
        ChildKind::Operation,
        action,
        action_tree(),
        existing.remove(&action).unwrap_or_default(),
    )?;

    assert!(second.writes.is_empty());
    assert_eq!(engine.store().write_calls(), 0);
    let first_ids: Vec<_> = first.rows.iter().map(|row| row.id).collect();
    let second_ids: Vec<_> = second.rows.iter().map(|row| row.id).collect();
    assert_eq!(first_ids, second_ids);
    Ok(())
}

#[test]
fn absent_collections_are_left_alone_and_empty_ones_cleared() -> Result<()> {
    let action = RowId::new(3);
    let mut engine = engine(MemoryStore::new());
    engine.reconcile(ChildKind::Operation, action, action_tree(), Vec::new())?;
    let mut loaded = load_existing(engine.store_mut(), ChildKind::Operation, &[action])?;
    let existing = loaded.remove(&action).unwrap_or_default();

    let desired = vec![
        Row::new(fields! { "operationtype" => 0, "recovery" => 0, "esc_period" => "0" })
            .with_children(ChildKind::OpTag, Vec::new()),
        Row::new(fields! { "operationtype" => 1, "recovery" => 0, "esc_period" => "0" }),
    ];
    let result = engine.reconcile(ChildKind::Operation, action, desired, existing)?;

    assert_eq!(result.writes.deleted_count(), 1);
    assert!(result.writes.table("optag").is_some());
    assert_eq!(engine.store().rows(ChildKind::OpMessageGroup.table()).len(), 2);
    assert_eq!(engine.store().rows(ChildKind::OpCondition.table()).len(), 1);
    Ok(())
}

#[test]
fn nested_levels_are_batched_across_parents() -> Result<()> {
    let groups = vec![
        Group::new(
            RowId::new(1),
            vec![
                message_operation(&[10, 11]).with_children(ChildKind::OpMessage, vec![message("a")]),
                command_operation(5, &[20, 21], &[30]),
            ],
            Vec::new(),
        ),
        Group::new(
            RowId::new(2),
            vec![
                message_operation(&[12]).with_children(ChildKind::OpMessage, vec![message("b")]),
                operation(4).with_children(
                    ChildKind::OpGroup,
                    vec![Row::new(fields! { "groupid" => 50 })],
                ),
                operation(6).with_children(
                    ChildKind::OpTemplate,
                    vec![Row::new(fields! { "templateid" => 40 })],
                ),
                operation(10).with_children(
                    ChildKind::OpInventory,
                    vec![Row::new(fields! { "inventory_mode" => 1 })],
                ),
            ],
            Vec::new(),
        ),
    ];
    let mut engine = engine(MemoryStore::new());
    let result = engine.reconcile_groups(ChildKind::Operation, groups)?;

    let inserts: Vec<_> = engine
        .store()
        .journal()
        .iter()
        .filter(|call| call.op == StoreOp::Insert)
        .map(|call| (call.table, call.rows))
        .collect();
    assert_eq!(
        inserts,
        vec![
            ("operations", 6),
            ("opmessage", 2),
            ("opmessage_grp", 3),
            ("opcommand", 1),
            ("opcommand_hst", 2),
            ("opcommand_grp", 1),
            ("opgroup", 1),
            ("optemplate", 1),
            ("opinventory", 1),
        ]
    );

    for rows in &result.groups {
        let operation = &rows[0];
        let operation_id = operation.id.expect("operation id");
        for child in operation.children_of(ChildKind::OpMessageGroup).unwrap_or_default() {
            let stored = engine
                .store()
                .rows(ChildKind::OpMessageGroup.table())
                .into_iter()
                .find(|row| Some(row.id) == child.id)
                .expect("stored child");
            assert_eq!(stored.parent_id, operation_id);
            assert_eq!(stored.fields, child.fields);
        }
    }
    assert_eq!(
        result
            .writes
            .touched_parents("opmessage_grp")
            .map(BTreeSet::len),
        Some(2)
    );
    Ok(())
}

#[test]
fn singleton_rows_are_updated_in_place() -> Result<()> {
    let action = RowId::new(8);
    let tree = |subject: &str| {
        vec![message_operation(&[1]).with_children(ChildKind::OpMessage, vec![message(subject)])]
    };
    let mut engine = engine(MemoryStore::new());
    engine.reconcile(ChildKind::Operation, action, tree("down"), Vec::new())?;
    let before = engine.store().rows(ChildKind::OpMessage.table());
    let mut loaded = load_existing(engine.store_mut(), ChildKind::Operation, &[action])?;
    engine.store_mut().clear_journal();

    let result = engine.reconcile(
        ChildKind::Operation,
        action,
        tree("up"),
        loaded.remove(&action).unwrap_or_default(),
    )?;

    assert_eq!(result.writes.inserted_count(), 0);
    assert_eq!(result.writes.deleted_count(), 0);
    let updated = &result.writes.table("opmessage").expect("writes").updated;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].id, before[0].id);
    assert_eq!(updated[0].values, fields! { "subject" => "up" });
    Ok(())
}

#[test]
fn inserts_and_deletes_are_chunked() -> Result<()> {
    let settings = EngineSettings {
        insert_batch_size: 2,
        delete_batch_size: 2,
        ..EngineSettings::default()
    };
    let host = RowId::new(4);
    let desired: Vec<Row> = (0..5).map(|n| tag("tag", &n.to_string())).collect();
    let mut engine = engine_with(MemoryStore::new(), settings);
    engine.reconcile(ChildKind::HostTag, host, desired, Vec::new())?;

    let count = |engine: &Reconciler<MemoryStore>, op: StoreOp| {
        engine
            .store()
            .journal()
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.rows)
            .collect::<Vec<_>>()
    };
    assert_eq!(count(&engine, StoreOp::Insert), vec![2, 2, 1]);

    let existing = stored_rows(engine.store(), ChildKind::HostTag);
    engine.store_mut().clear_journal();
    engine.reconcile(ChildKind::HostTag, host, Vec::new(), existing)?;
    assert_eq!(count(&engine, StoreOp::Delete), vec![2, 2, 1]);
    assert_eq!(engine.metrics().rows_written("host_tag", WriteOp::Delete), 5);
    assert_eq!(engine.metrics().snapshot().insert_calls, 3);
    Ok(())
}

#[test]
fn ids_follow_tokens_not_result_order() -> Result<()> {
    let host = RowId::new(4);
    let desired = vec![
        Row::new(fields! { "macro" => "{$A}", "value" => "1" }),
        Row::new(fields! { "macro" => "{$B}", "value" => "2" }),
        Row::new(fields! { "macro" => "{$C}", "value" => "3" }),
    ];
    let mut engine = engine(MemoryStore::new().with_reversed_insert_results());
    let result = engine.reconcile(ChildKind::HostMacro, host, desired.clone(), Vec::new())?;

    for (row, wanted) in result.rows.iter().zip(&desired) {
        let id = row.id.expect("id");
        assert_eq!(engine.store().fields(ChildKind::HostMacro.table(), id), Some(&wanted.fields));
    }
    Ok(())
}

#[test]
fn swapped_unique_names_go_through_placeholders() -> Result<()> {
    let kind = ChildKind::Override;
    let rule = RowId::new(9);
    let mut store = MemoryStore::new().with_unique(kind.table(), "name");
    let first = store.seed(kind.table(), rule, fields! { "step" => 1, "name" => "a" });
    let second = store.seed(kind.table(), rule, fields! { "step" => 2, "name" => "b" });
    let existing = stored_rows(&store, kind);

    let mut engine = engine(store);
    let result = engine.reconcile(
        kind,
        rule,
        vec![override_row(1, "b"), override_row(2, "a")],
        existing,
    )?;

    let table = kind.table();
    assert_eq!(
        engine.store().fields(table, first),
        Some(&fields! { "step" => 1, "name" => "b" })
    );
    assert_eq!(
        engine.store().fields(table, second),
        Some(&fields! { "step" => 2, "name" => "a" })
    );
    let updates: Vec<usize> = engine
        .store()
        .journal()
        .iter()
        .filter(|call| call.op == StoreOp::Update)
        .map(|call| call.rows)
        .collect();
    assert_eq!(updates, vec![2, 2]);
    let updated = &result.writes.table("lld_override").expect("writes").updated;
    assert_eq!(updated[0].values, fields! { "name" => "b" });
    assert_eq!(updated[0].previous, fields! { "name" => "a" });
    Ok(())
}

#[test]
fn chained_renames_only_defer_colliding_values() -> Result<()> {
    let kind = ChildKind::Override;
    let rule = RowId::new(9);
    let mut store = MemoryStore::new().with_unique(kind.table(), "name");
    let first = store.seed(kind.table(), rule, fields! { "step" => 1, "name" => "a" });
    let second = store.seed(kind.table(), rule, fields! { "step" => 2, "name" => "b" });
    let existing = stored_rows(&store, kind);

    let mut engine = engine(store);
    let result = engine.reconcile(
        kind,
        rule,
        vec![override_row(1, "b"), override_row(2, "c")],
        existing,
    )?;

    let table = kind.table();
    assert_eq!(
        engine.store().fields(table, first),
        Some(&fields! { "step" => 1, "name" => "b" })
    );
    assert_eq!(
        engine.store().fields(table, second),
        Some(&fields! { "step" => 2, "name" => "c" })
    );
    let updates: Vec<usize> = engine
        .store()
        .journal()
        .iter()
        .filter(|call| call.op == StoreOp::Update)
        .map(|call| call.rows)
        .collect();
    assert_eq!(updates, vec![2, 1]);
    assert_eq!(result.writes.updated_count(), 2);
    Ok(())
}

#[test]
fn storage_failures_propagate_without_compensation() {
    let mut store = MemoryStore::new();
    store.fail_next(StoreOp::Insert, ChildKind::OpMessageGroup.table());
    let mut engine = engine(store);

    let result = engine.reconcile(
        ChildKind::Operation,
        RowId::new(1),
        vec![message_operation(&[1])],
        Vec::new(),
    );

    assert!(matches!(
        result,
        Err(ReconcileError::Store {
            source: StoreError::Rejected {
                reason: "injected failure",
                table: "opmessage_grp",
                ..
            }
        })
    ));
    assert_eq!(engine.store().rows(ChildKind::Operation.table()).len(), 1);
}

#[test]
fn children_of_unrelated_kinds_are_rejected_before_writing() {
    let mut engine = engine(MemoryStore::new());
    let desired = vec![tag("a", "b").with_children(ChildKind::OpTag, vec![tag("x", "")])];
    let result = engine.reconcile(ChildKind::HostTag, RowId::new(1), desired, Vec::new());
    assert!(matches!(
        result,
        Err(ReconcileError::UnexpectedChildren {
            table: "host_tag",
            child: "optag"
        })
    ));
    assert!(engine.store().journal().is_empty());
}

/// Store that mangles the `(token, id)` pairs returned by inserts.
struct Mangled {
    inner: MemoryStore,
    mode: Mangle,
}

enum Mangle {
    DropLast,
    Repeat,
    Foreign,
}

impl Store for Mangled {
    fn insert(
        &mut self,
        table: &rowsync_model::TableSpec,
        rows: &[InsertRow],
    ) -> StoreResult<Vec<(Correlation, RowId)>> {
        let mut pairs = self.inner.insert(table, rows)?;
        match self.mode {
            Mangle::DropLast => {
                pairs.pop();
            }
            Mangle::Repeat => {
                let first = pairs[0];
                pairs.push(first);
            }
            Mangle::Foreign => pairs.push((Correlation::new(999), RowId::new(999))),
        }
        Ok(pairs)
    }

    fn update(&mut self, table: &rowsync_model::TableSpec, rows: &[RowUpdate]) -> StoreResult<()> {
        self.inner.update(table, rows)
    }

    fn delete(&mut self, table: &rowsync_model::TableSpec, ids: &[RowId]) -> StoreResult<()> {
        self.inner.delete(table, ids)
    }

    fn select(
        &mut self,
        table: &rowsync_model::TableSpec,
        parent_ids: &[RowId],
    ) -> StoreResult<Vec<SelectedRow>> {
        self.inner.select(table, parent_ids)
    }
}

#[test]
fn mangled_insert_results_are_detected() {
    let run = |mode| {
        let store = Mangled {
            inner: MemoryStore::new(),
            mode,
        };
        let mut engine = Reconciler::new(
            store,
            EngineSettings::default(),
            Metrics::new().expect("metrics registry"),
        );
        engine.reconcile(
            ChildKind::HostTag,
            RowId::new(1),
            vec![tag("a", ""), tag("b", "")],
            Vec::new(),
        )
    };

    assert!(matches!(
        run(Mangle::DropLast),
        Err(ReconcileError::MissingGeneratedId { table: "host_tag", .. })
    ));
    assert!(matches!(
        run(Mangle::Repeat),
        Err(ReconcileError::UnknownCorrelation { table: "host_tag", .. })
    ));
    assert!(matches!(
        run(Mangle::Foreign),
        Err(ReconcileError::UnknownCorrelation { table: "host_tag", .. })
    ));
}

proptest! {
    #[test]
    fn full_insert_assigns_fresh_ids_in_order(
        macros in proptest::collection::btree_set("[A-Z]{1,6}", 0..24),
        batch in 1usize..6,
    ) {
        let desired: Vec<Row> = macros
            .iter()
            .map(|name| Row::new(fields! { "macro" => format!("{{${name}}}"), "value" => "" }))
            .collect();
        let settings = EngineSettings { insert_batch_size: batch, ..EngineSettings::default() };
        let mut engine = engine_with(MemoryStore::new(), settings);
        let result = engine
            .reconcile(ChildKind::HostMacro, RowId::new(1), desired.clone(), Vec::new())
            .expect("reconcile");

        prop_assert_eq!(result.writes.inserted_count(), desired.len());
        let ids: BTreeSet<RowId> = result.rows.iter().filter_map(|row| row.id).collect();
        prop_assert_eq!(ids.len(), desired.len());
        for (row, wanted) in result.rows.iter().zip(&desired) {
            prop_assert_eq!(&row.fields, &wanted.fields);
        }
    }
}
