//! Validation of expression filters against their conditions.

use std::collections::BTreeSet;

use rowsync_model::{Condition, Filter};

use crate::error::{FormulaError, FormulaResult};
use crate::parse::{Formula, parse};

/// Check that `formula` and the labels of `conditions` describe the same set.
///
/// Checks run in a fixed order: labels present and unique, formula letters
/// defined, condition labels referenced, then the count.
///
/// # Errors
///
/// Returns the first [`FormulaError`] found.
pub fn validate(formula: &Formula, conditions: &[Condition]) -> FormulaResult<()> {
    let mut labels = BTreeSet::new();
    for (index, condition) in conditions.iter().enumerate() {
        let Some(formulaid) = condition.formulaid.as_deref() else {
            return Err(FormulaError::MissingFormulaId { index });
        };
        if !labels.insert(formulaid) {
            return Err(FormulaError::DuplicateFormulaId {
                formulaid: formulaid.to_owned(),
            });
        }
    }

    let letters = formula.letters();
    if let Some(undefined) = letters.iter().find(|letter| !labels.contains(**letter)) {
        return Err(FormulaError::UndefinedFormulaId {
            formulaid: (*undefined).to_owned(),
        });
    }

    let referenced: BTreeSet<&str> = letters.iter().copied().collect();
    for condition in conditions {
        if let Some(formulaid) = condition.formulaid.as_deref()
            && !referenced.contains(formulaid)
        {
            return Err(FormulaError::UnreferencedCondition {
                formulaid: formulaid.to_owned(),
            });
        }
    }

    if letters.len() != conditions.len() {
        return Err(FormulaError::ConditionCountMismatch {
            constants: letters.len(),
            conditions: conditions.len(),
        });
    }
    Ok(())
}

/// Validate a submitted filter; returns the parsed formula for expression filters.
///
/// Non-expression filters ignore their formula and labels and always pass.
///
/// # Errors
///
/// Returns a parse or validation [`FormulaError`] for expression filters.
pub fn validate_filter(filter: &Filter) -> FormulaResult<Option<Formula>> {
    if !filter.evaltype.is_expression() {
        return Ok(None);
    }
    let formula = parse(&filter.formula)?;
    validate(&formula, &filter.conditions)?;
    Ok(Some(formula))
}

#[cfg(test)]
mod tests {
    use rowsync_model::{ConditionType, EvalType};

    use super::*;

    fn labelled(label: &str, value: &str) -> Condition {
        Condition::new(ConditionType::HOST, value).with_formulaid(label)
    }

    #[test]
    fn matching_sets_pass() {
        let formula = parse("A and (B or A)").expect("parse");
        assert_eq!(
            validate(&formula, &[labelled("A", "1"), labelled("B", "2")]),
            Ok(())
        );
    }

    #[test]
    fn formula_letter_without_condition_is_undefined() {
        let formula = parse("A and B").expect("parse");
        assert_eq!(
            validate(&formula, &[labelled("A", "1")]),
            Err(FormulaError::UndefinedFormulaId {
                formulaid: "B".to_owned()
            })
        );
    }

    #[test]
    fn condition_outside_formula_is_unreferenced() {
        let formula = parse("A").expect("parse");
        assert_eq!(
            validate(&formula, &[labelled("A", "1"), labelled("C", "2")]),
            Err(FormulaError::UnreferencedCondition {
                formulaid: "C".to_owned()
            })
        );
    }

    #[test]
    fn labels_must_be_present_and_unique() {
        let formula = parse("A").expect("parse");
        assert_eq!(
            validate(&formula, &[Condition::new(ConditionType::HOST, "1")]),
            Err(FormulaError::MissingFormulaId { index: 0 })
        );
        assert_eq!(
            validate(&formula, &[labelled("A", "1"), labelled("A", "2")]),
            Err(FormulaError::DuplicateFormulaId {
                formulaid: "A".to_owned()
            })
        );
    }

    #[test]
    fn non_expression_filters_skip_validation() {
        let filter = Filter {
            evaltype: EvalType::Or,
            formula: "not a formula".to_owned(),
            conditions: vec![Condition::new(ConditionType::HOST, "1")],
        };
        assert_eq!(validate_filter(&filter), Ok(None));
    }

    #[test]
    fn expression_filters_are_parsed() {
        let filter = Filter::expression("A or", vec![labelled("A", "1")]);
        assert!(matches!(
            validate_filter(&filter),
            Err(FormulaError::MalformedFormula { position: 4, .. })
        ));
    }
}
