//! Property and scenario tests for the formula compiler.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rowsync_formula::{
    FormulaError, compute_auto_formula, letter, parse, rewrite_ids_to_letters,
    rewrite_letters_to_ids, validate_filter,
};
use rowsync_model::{Condition, ConditionType, EvalType, Filter, Operator, RowId};

fn condition_strategy() -> impl Strategy<Value = Condition> {
    (0i64..5, 0i64..3, "[0-9]{1,3}", "[a-z]{0,2}").prop_map(
        |(conditiontype, operator, value, value2)| {
            Condition::new(ConditionType::new(conditiontype), value)
                .with_operator(Operator::new(operator))
                .with_value2(value2)
        },
    )
}

fn evaltype_strategy() -> impl Strategy<Value = EvalType> {
    prop_oneof![
        Just(EvalType::AndOr),
        Just(EvalType::And),
        Just(EvalType::Or)
    ]
}

fn formula_strategy() -> impl Strategy<Value = String> {
    let leaf = (0usize..6).prop_map(letter);
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} and {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} or {b}")),
            inner.prop_map(|a| format!("({a})")),
        ]
    })
}

proptest! {
    #[test]
    fn auto_formula_ignores_submission_order(
        (conditions, shuffled) in proptest::collection::vec(condition_strategy(), 0..8)
            .prop_flat_map(|conditions| (Just(conditions.clone()), Just(conditions).prop_shuffle())),
        evaltype in evaltype_strategy(),
    ) {
        prop_assert_eq!(
            compute_auto_formula(evaltype, &conditions),
            compute_auto_formula(evaltype, &shuffled)
        );
    }

    #[test]
    fn rewrite_round_trips(
        formula in formula_strategy(),
        ids in proptest::collection::btree_set(1i64..1_000_000, 6),
    ) {
        let to_ids: BTreeMap<String, RowId> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| (letter(index), RowId::new(*id)))
            .collect();
        let to_letters: BTreeMap<RowId, String> =
            to_ids.iter().map(|(letter, id)| (*id, letter.clone())).collect();

        let numeric = rewrite_letters_to_ids(&formula, &to_ids)
            .unwrap_or_else(|e| panic!("rewrite {formula}: {e}"));
        let back = rewrite_ids_to_letters(&numeric, &to_letters)
            .unwrap_or_else(|e| panic!("rewrite back {numeric}: {e}"));
        prop_assert_eq!(back, formula);
    }

    #[test]
    fn generated_formulas_parse(
        conditions in proptest::collection::vec(condition_strategy(), 1..8),
        evaltype in evaltype_strategy(),
    ) {
        let formula = compute_auto_formula(evaltype, &conditions);
        let parsed = parse(&formula).unwrap_or_else(|e| panic!("parse {formula}: {e}"));
        prop_assert_eq!(parsed.letters().len(), conditions.len());
    }
}

#[test]
fn two_host_groups_or_into_two_terms() {
    let conditions = vec![
        Condition::new(ConditionType::HOST_GROUP, "5"),
        Condition::new(ConditionType::HOST_GROUP, "6"),
    ];
    assert_eq!(compute_auto_formula(EvalType::Or, &conditions), "A or B");
}

#[test]
fn expression_with_missing_condition_is_rejected() {
    let filter = Filter::expression(
        "A and B",
        vec![Condition::new(ConditionType::HOST, "7").with_formulaid("A")],
    );
    assert_eq!(
        validate_filter(&filter),
        Err(FormulaError::UndefinedFormulaId {
            formulaid: "B".to_owned()
        })
    );
}
