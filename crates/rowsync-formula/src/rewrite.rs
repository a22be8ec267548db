//! Substitution passes between the letter and numeric dialects.

use std::collections::BTreeMap;

use rowsync_model::{Condition, RowId};

use crate::error::{FormulaError, FormulaResult};
use crate::letters::letter;
use crate::parse::{Formula, Operand, parse, parse_numeric};

/// Replace every letter of `formula` with the `{id}` mapped to it.
///
/// # Errors
///
/// Returns a parse error, or [`FormulaError::UnmappedFormulaId`] for a letter
/// missing from `ids`.
pub fn rewrite_letters_to_ids(
    formula: &str,
    ids: &BTreeMap<String, RowId>,
) -> FormulaResult<String> {
    parse(formula)?.substitute(|operand| match operand {
        Operand::Letter(letter) => ids
            .get(letter)
            .map(|id| format!("{{{id}}}"))
            .ok_or_else(|| FormulaError::UnmappedFormulaId {
                formulaid: letter.clone(),
            }),
        Operand::Id(id) => Ok(format!("{{{id}}}")),
    })
}

/// Replace every `{id}` of `numeric` with the letter mapped to it.
///
/// # Errors
///
/// Returns a parse error, or [`FormulaError::UnmappedConditionId`] for an id
/// missing from `letters`.
pub fn rewrite_ids_to_letters(
    numeric: &str,
    letters: &BTreeMap<RowId, String>,
) -> FormulaResult<String> {
    parse_numeric(numeric)?.substitute(|operand| match operand {
        Operand::Id(id) => letters
            .get(id)
            .cloned()
            .ok_or(FormulaError::UnmappedConditionId { id: *id }),
        Operand::Letter(letter) => Ok(letter.clone()),
    })
}

/// Letters `A, B, ..` assigned to the ids of a numeric formula by first appearance.
#[must_use]
pub fn letters_by_appearance(numeric: &Formula) -> BTreeMap<RowId, String> {
    numeric
        .ids()
        .into_iter()
        .enumerate()
        .map(|(index, id)| (id, letter(index)))
        .collect()
}

/// Rename the letters of `formula` to `A, B, ..` by first appearance.
///
/// Condition labels are renamed consistently; conditions whose label is not in
/// the formula keep it unchanged.
///
/// # Errors
///
/// Returns a parse error for `formula`.
pub fn reset_formula_ids(formula: &str, conditions: &mut [Condition]) -> FormulaResult<String> {
    let parsed = parse(formula)?;
    let renames: BTreeMap<String, String> = parsed
        .letters()
        .into_iter()
        .enumerate()
        .map(|(index, old)| (old.to_owned(), letter(index)))
        .collect();
    for condition in conditions.iter_mut() {
        if let Some(renamed) = condition
            .formulaid
            .as_ref()
            .and_then(|formulaid| renames.get(formulaid))
        {
            condition.formulaid = Some(renamed.clone());
        }
    }
    parsed.substitute(|operand| match operand {
        Operand::Letter(old) => Ok(renames.get(old).cloned().unwrap_or_else(|| old.clone())),
        Operand::Id(id) => Ok(format!("{{{id}}}")),
    })
}
