//! Canonical condition order and generated formulas.
//!
//! # Design
//! - Canonical order sorts descending by `(conditiontype, operator, value2, value)`;
//!   residual ties fall back to ascending stored id, then submission order, so
//!   the same condition set always yields the same formula.
//! - `AND_OR` groups conditions of the same type with `or` and joins groups
//!   with `and`; parentheses only appear when there is more than one group.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rowsync_model::{Condition, EvalType, RowId};

use crate::error::{FormulaError, FormulaResult};
use crate::letters::letter;

/// Indexes of `conditions` in canonical order.
#[must_use]
pub fn canonical_order(conditions: &[Condition]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..conditions.len()).collect();
    order.sort_by(|&a, &b| canonical_cmp(&conditions[a], &conditions[b]));
    order
}

fn canonical_cmp(a: &Condition, b: &Condition) -> Ordering {
    b.conditiontype
        .cmp(&a.conditiontype)
        .then_with(|| b.operator.cmp(&a.operator))
        .then_with(|| b.value2.cmp(&a.value2))
        .then_with(|| b.value.cmp(&a.value))
        .then_with(|| a.id.cmp(&b.id))
}

/// Letter for each condition, indexed like `conditions`, assigned in canonical order.
#[must_use]
pub fn canonical_letters(conditions: &[Condition]) -> Vec<String> {
    let mut letters = vec![String::new(); conditions.len()];
    for (rank, index) in canonical_order(conditions).into_iter().enumerate() {
        letters[index] = letter(rank);
    }
    letters
}

/// Letter formula generated for a non-expression filter.
///
/// [`EvalType::Expression`] has no generated form; it is rendered with the
/// `AND_OR` structure so callers always get a readable formula.
#[must_use]
pub fn compute_auto_formula(evaltype: EvalType, conditions: &[Condition]) -> String {
    let letters = canonical_letters(conditions);
    render(evaltype, conditions, |index| letters[index].clone())
}

/// Numeric formula generated for a non-expression filter of stored conditions.
///
/// # Errors
///
/// Returns [`FormulaError::MissingConditionId`] when a condition has no id.
pub fn compute_auto_numeric_formula(
    evaltype: EvalType,
    conditions: &[Condition],
) -> FormulaResult<String> {
    let ids = stored_ids(conditions)?;
    Ok(render(evaltype, conditions, |index| format!("{{{}}}", ids[index])))
}

/// Letters for stored conditions, keyed by id, assigned in canonical order.
///
/// # Errors
///
/// Returns [`FormulaError::MissingConditionId`] when a condition has no id.
pub fn assign_formula_ids(conditions: &[Condition]) -> FormulaResult<BTreeMap<RowId, String>> {
    let ids = stored_ids(conditions)?;
    Ok(ids
        .into_iter()
        .zip(canonical_letters(conditions))
        .collect())
}

fn stored_ids(conditions: &[Condition]) -> FormulaResult<Vec<RowId>> {
    conditions
        .iter()
        .enumerate()
        .map(|(index, condition)| {
            condition
                .id
                .ok_or(FormulaError::MissingConditionId { index })
        })
        .collect()
}

fn render(
    evaltype: EvalType,
    conditions: &[Condition],
    label: impl Fn(usize) -> String,
) -> String {
    let order = canonical_order(conditions);
    match evaltype {
        EvalType::And => join(order.iter().map(|&index| label(index)), " and "),
        EvalType::Or => join(order.iter().map(|&index| label(index)), " or "),
        EvalType::AndOr | EvalType::Expression => {
            let mut groups: Vec<Vec<String>> = Vec::new();
            let mut previous = None;
            for index in order {
                let conditiontype = conditions[index].conditiontype;
                match groups.last_mut() {
                    Some(group) if previous == Some(conditiontype) => group.push(label(index)),
                    _ => groups.push(vec![label(index)]),
                }
                previous = Some(conditiontype);
            }
            let parenthesize = groups.len() > 1;
            join(
                groups.into_iter().map(|group| {
                    let inner = join(group.iter().cloned(), " or ");
                    if parenthesize && group.len() > 1 {
                        format!("({inner})")
                    } else {
                        inner
                    }
                }),
                " and ",
            )
        }
    }
}

fn join(parts: impl Iterator<Item = String>, separator: &str) -> String {
    parts.collect::<Vec<_>>().join(separator)
}
