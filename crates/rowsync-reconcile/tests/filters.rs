//! Filter persistence through the engine.

use anyhow::Result;
use rowsync_config::EngineSettings;
use rowsync_formula::{FormulaError, read_back};
use rowsync_model::{
    ChildKind, EvalType, FieldValue, Filter, FilterOwner, RowId, StoredFilter, fields,
};
use rowsync_reconcile::{
    FilterJob, MemoryStore, ReconcileError, Reconciler, load_conditions, load_existing,
};
use rowsync_telemetry::Metrics;
use rowsync_test_support::fixtures::{
    combined, host, host_group, labelled_expression, macro_matches, override_row,
};

fn engine(store: MemoryStore) -> Reconciler<MemoryStore> {
    Reconciler::new(
        store,
        EngineSettings::default(),
        Metrics::new().expect("metrics registry"),
    )
}

fn stored_filter(engine: &mut Reconciler<MemoryStore>, owner: FilterOwner, id: RowId) -> Result<StoredFilter> {
    let fields = engine
        .store()
        .fields(owner.table(), id)
        .cloned()
        .unwrap_or_default();
    let evaltype = match fields.get("evaltype") {
        Some(FieldValue::Int(code)) => EvalType::try_from(*code)?,
        _ => EvalType::AndOr,
    };
    let formula = fields
        .get("formula")
        .and_then(FieldValue::as_str)
        .unwrap_or_default()
        .to_owned();
    let conditions = load_conditions(engine.store_mut(), owner, &[id])?
        .remove(&id)
        .unwrap_or_default();
    Ok(StoredFilter {
        evaltype,
        formula,
        conditions,
    })
}

#[test]
fn expression_filter_is_stored_with_condition_ids() -> Result<()> {
    let mut store = MemoryStore::new();
    let action = store.seed_root(FilterOwner::Action.table(), fields! { "name" => "page" });
    let mut engine = engine(store);

    let synced = engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: labelled_expression(
                "A or (B and C)",
                vec![host("1"), host("2"), host_group("3")],
            ),
            existing: None,
        },
    )?;

    let filter = &synced.filters[0];
    let ids: Vec<i64> = filter
        .filter
        .conditions
        .iter()
        .filter_map(|c| c.id.map(RowId::get))
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(filter.stored_formula, "{1} or ({2} and {3})");
    assert_eq!(filter.eval_formula, "A or (B and C)");
    assert_eq!(filter.filter.formula, "A or (B and C)");

    let stored = stored_filter(&mut engine, FilterOwner::Action, action)?;
    assert_eq!(stored.evaltype, EvalType::Expression);
    assert_eq!(stored.formula, "{1} or ({2} and {3})");

    let view = read_back(stored.evaltype, &stored.formula, stored.conditions)?;
    assert_eq!(view.formula, "A or (B and C)");
    assert_eq!(view.eval_formula, view.formula);
    Ok(())
}

#[test]
fn unchanged_filter_writes_nothing() -> Result<()> {
    let mut store = MemoryStore::new();
    let action = store.seed_root(FilterOwner::Action.table(), fields! { "name" => "page" });
    let mut engine = engine(store);
    let filter = labelled_expression("A and B", vec![host("1"), host("2")]);
    engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: filter.clone(),
            existing: None,
        },
    )?;

    let existing = stored_filter(&mut engine, FilterOwner::Action, action)?;
    engine.store_mut().clear_journal();
    let again = engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: filter,
            existing: Some(existing),
        },
    )?;

    assert!(again.writes.is_empty());
    assert_eq!(engine.store().write_calls(), 0);
    Ok(())
}

#[test]
fn switching_away_from_an_expression_clears_the_formula() -> Result<()> {
    let mut store = MemoryStore::new();
    let action = store.seed_root(FilterOwner::Action.table(), fields! { "name" => "page" });
    let mut engine = engine(store);
    engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: labelled_expression("A and B", vec![host_group("5"), host_group("6")]),
            existing: None,
        },
    )?;
    let existing = stored_filter(&mut engine, FilterOwner::Action, action)?;

    let synced = engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: combined(EvalType::Or, vec![host_group("6"), host_group("5")]),
            existing: Some(existing),
        },
    )?;

    let filter = &synced.filters[0];
    assert_eq!(filter.stored_formula, "");
    assert_eq!(filter.filter.formula, "");
    assert_eq!(filter.eval_formula, "A or B");
    assert_eq!(filter.filter.conditions[0].formulaid.as_deref(), Some("A"));
    assert_eq!(filter.filter.conditions[1].formulaid.as_deref(), Some("B"));
    assert_eq!(synced.writes.inserted_count(), 0);

    let owner = &synced.writes.table("actions").expect("owner update").updated[0];
    assert_eq!(
        owner.values,
        fields! { "evaltype" => EvalType::Or.code(), "formula" => "" }
    );
    assert_eq!(
        owner.previous,
        fields! { "evaltype" => EvalType::Expression.code(), "formula" => "{1} and {2}" }
    );
    Ok(())
}

#[test]
fn undefined_letters_fail_before_any_write() {
    let mut store = MemoryStore::new();
    let action = store.seed_root(FilterOwner::Action.table(), fields! { "name" => "page" });
    let mut engine = engine(store);

    let result = engine.sync_filter(
        FilterOwner::Action,
        FilterJob {
            owner_id: action,
            desired: Filter::expression("A and B", vec![host("7").with_formulaid("A")]),
            existing: None,
        },
    );

    match result {
        Err(ReconcileError::InvalidFilter { source, .. }) => assert_eq!(
            source,
            FormulaError::UndefinedFormulaId {
                formulaid: "B".to_owned()
            }
        ),
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert!(engine.store().journal().is_empty());
    assert_eq!(engine.metrics().formula_rejections("undefined_formula_id"), 1);
}

#[test]
fn override_filters_are_reconciled_with_their_rows() -> Result<()> {
    let rule = RowId::new(12);
    let mut engine = engine(MemoryStore::new());
    let desired = vec![
        override_row(1, "discard").with_filter(labelled_expression(
            "A and B",
            vec![macro_matches("{#FS}", "^/boot"), macro_matches("{#TYPE}", "^tmpfs$")],
        )),
        override_row(2, "keep"),
    ];

    let first = engine.reconcile(ChildKind::Override, rule, desired, Vec::new())?;
    let override_id = first.rows[0].id.expect("override id");
    let stored = engine
        .store()
        .fields(ChildKind::Override.table(), override_id)
        .cloned()
        .unwrap_or_default();
    assert_eq!(stored.get("evaltype"), Some(&FieldValue::Int(3)));
    assert_eq!(stored.get("formula"), Some(&FieldValue::from("{1} and {2}")));
    assert!(first.rows[1].filter.is_none());

    let mut loaded = load_existing(engine.store_mut(), ChildKind::Override, &[rule])?;
    let existing = loaded.remove(&rule).unwrap_or_default();
    assert_eq!(
        existing[0].filter.as_ref().map(|f| f.formula.as_str()),
        Some("{1} and {2}")
    );
    engine.store_mut().clear_journal();

    let desired = vec![
        override_row(1, "discard").with_filter(combined(
            EvalType::Or,
            vec![macro_matches("{#FS}", "^/boot"), macro_matches("{#TYPE}", "^tmpfs$")],
        )),
        override_row(2, "keep"),
    ];
    let second = engine.reconcile(ChildKind::Override, rule, desired, existing)?;

    let filter = second.rows[0].filter.as_ref().expect("filter");
    assert_eq!(filter.evaltype, EvalType::Or);
    assert!(filter.formula.is_empty());
    assert_eq!(second.writes.inserted_count(), 0);
    assert_eq!(second.writes.updated_count(), 1);
    let stored = engine
        .store()
        .fields(ChildKind::Override.table(), override_id)
        .cloned()
        .unwrap_or_default();
    assert_eq!(stored.get("formula"), Some(&FieldValue::from("")));
    Ok(())
}

#[test]
fn invalid_nested_filter_blocks_the_whole_tree() {
    let mut engine = engine(MemoryStore::new());
    let desired = vec![
        override_row(1, "fine"),
        override_row(2, "broken").with_filter(Filter::expression(
            "A and",
            vec![macro_matches("{#X}", "y").with_formulaid("A")],
        )),
    ];

    let result = engine.reconcile(ChildKind::Override, RowId::new(1), desired, Vec::new());
    match result {
        Err(ReconcileError::InvalidFilter { path, source }) => {
            assert_eq!(path, "override[1].filter");
            assert_eq!(source.reason(), "malformed_formula");
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert!(engine.store().journal().is_empty());
}

#[test]
fn override_formulas_are_returned_with_the_rows() -> Result<()> {
    let rule = RowId::new(4);
    let mut engine = engine(MemoryStore::new());
    let desired = vec![
        override_row(1, "expr").with_filter(labelled_expression(
            "A or B",
            vec![macro_matches("{#FS}", "^/$"), macro_matches("{#FS}", "^/var$")],
        )),
        override_row(2, "auto").with_filter(combined(
            EvalType::And,
            vec![macro_matches("{#TYPE}", "^ext4$")],
        )),
        override_row(3, "plain"),
    ];

    let result = engine.reconcile(ChildKind::Override, rule, desired, Vec::new())?;

    assert_eq!(result.filters.len(), 2);
    let expr_id = result.rows[0].id.expect("override id");
    let expr = &result.filters[&(FilterOwner::Override, expr_id)];
    let ids: Vec<i64> = expr
        .filter
        .conditions
        .iter()
        .filter_map(|c| c.id.map(RowId::get))
        .collect();
    assert_eq!(expr.eval_formula, "A or B");
    assert_eq!(expr.stored_formula, format!("{{{}}} or {{{}}}", ids[0], ids[1]));

    let auto_id = result.rows[1].id.expect("override id");
    let auto = &result.filters[&(FilterOwner::Override, auto_id)];
    assert_eq!(auto.stored_formula, "");
    assert_eq!(auto.eval_formula, "A");

    let plain_id = result.rows[2].id.expect("override id");
    assert!(!result.filters.contains_key(&(FilterOwner::Override, plain_id)));
    Ok(())
}
