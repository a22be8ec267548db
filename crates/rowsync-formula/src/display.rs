//! Read-back shaping of stored filters.
//!
//! # Design
//! - Expression filters keep their stored structure: conditions are listed in
//!   order of first appearance and lettered the same way.
//! - Other filters are shown in canonical order with canonical letters and a
//!   generated `eval_formula`; their `formula` is always empty.

use rowsync_model::{Condition, EvalType, StoredFilter};
use serde::Serialize;

use crate::auto::{assign_formula_ids, canonical_order, compute_auto_formula};
use crate::error::{FormulaError, FormulaResult};
use crate::parse::parse_numeric;
use crate::rewrite::{letters_by_appearance, rewrite_ids_to_letters};

/// Filter as returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterView {
    /// How conditions combine.
    pub evaltype: EvalType,
    /// Letter formula; empty unless the evaluation type is an expression.
    pub formula: String,
    /// Readable formula for every evaluation type.
    pub eval_formula: String,
    /// Conditions carrying ids and letter labels, in display order.
    pub conditions: Vec<Condition>,
}

/// Build the client view of a stored filter.
///
/// # Errors
///
/// Returns [`FormulaError::MissingConditionId`] when a condition has no id, or
/// a parse/mapping error when an expression formula does not match its
/// conditions.
pub fn read_back(
    evaltype: EvalType,
    stored_formula: &str,
    conditions: Vec<Condition>,
) -> FormulaResult<FilterView> {
    if let Some(index) = conditions.iter().position(|c| c.id.is_none()) {
        return Err(FormulaError::MissingConditionId { index });
    }

    if evaltype.is_expression() {
        let numeric = parse_numeric(stored_formula)?;
        let letters = letters_by_appearance(&numeric);
        let mut conditions = conditions;
        for condition in &mut conditions {
            condition.formulaid = condition.id.and_then(|id| letters.get(&id).cloned());
        }
        let ids = numeric.ids();
        conditions.sort_by_key(|condition| {
            condition
                .id
                .and_then(|id| ids.iter().position(|candidate| *candidate == id))
                .unwrap_or(usize::MAX)
        });
        let formula = rewrite_ids_to_letters(stored_formula, &letters)?;
        return Ok(FilterView {
            evaltype,
            eval_formula: formula.clone(),
            formula,
            conditions,
        });
    }

    let letters = assign_formula_ids(&conditions)?;
    let order = canonical_order(&conditions);
    let mut slots: Vec<Option<Condition>> = conditions.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(order.len());
    for index in order {
        if let Some(mut condition) = slots[index].take() {
            condition.formulaid = condition.id.and_then(|id| letters.get(&id).cloned());
            ordered.push(condition);
        }
    }
    Ok(FilterView {
        evaltype,
        formula: String::new(),
        eval_formula: compute_auto_formula(evaltype, &ordered),
        conditions: ordered,
    })
}

/// [`read_back`] for a loaded [`StoredFilter`].
///
/// # Errors
///
/// See [`read_back`].
pub fn read_back_filter(filter: &StoredFilter) -> FormulaResult<FilterView> {
    read_back(filter.evaltype, &filter.formula, filter.conditions.clone())
}
