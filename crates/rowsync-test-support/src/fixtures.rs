//! Row and condition builders shared by integration suites.

use rowsync_formula::letter;
use rowsync_model::{
    ChildKind, Condition, ConditionType, EvalType, Filter, Operator, Row, RowId, StoredRow, fields,
};

/// Equality condition on a host group.
#[must_use]
pub fn host_group(value: &str) -> Condition {
    Condition::new(ConditionType::HOST_GROUP, value)
}

/// Equality condition on a host.
#[must_use]
pub fn host(value: &str) -> Condition {
    Condition::new(ConditionType::HOST, value)
}

/// Regular expression condition as used by discovery filters.
#[must_use]
pub fn macro_matches(lld_macro: &str, pattern: &str) -> Condition {
    Condition::new(ConditionType::new(0), pattern)
        .with_operator(Operator::REGEXP)
        .with_value2(lld_macro)
}

/// Expression filter whose conditions are labelled `A, B, ..` in order.
#[must_use]
pub fn labelled_expression(formula: &str, conditions: Vec<Condition>) -> Filter {
    let conditions = conditions
        .into_iter()
        .enumerate()
        .map(|(index, condition)| condition.with_formulaid(letter(index)))
        .collect();
    Filter::expression(formula, conditions)
}

/// Filter joining `conditions` with `evaltype`.
#[must_use]
pub const fn combined(evaltype: EvalType, conditions: Vec<Condition>) -> Filter {
    Filter::new(evaltype, conditions)
}

/// Message operation notifying the given user groups.
#[must_use]
pub fn message_operation(usrgrpids: &[i64]) -> Row {
    Row::new(fields! { "operationtype" => 0, "recovery" => 0, "esc_period" => "0" }).with_children(
        ChildKind::OpMessageGroup,
        usrgrpids
            .iter()
            .map(|usrgrpid| Row::new(fields! { "usrgrpid" => *usrgrpid }))
            .collect(),
    )
}

/// Bare operation of the given type.
#[must_use]
pub fn operation(operationtype: i64) -> Row {
    Row::new(fields! { "operationtype" => operationtype, "recovery" => 0, "esc_period" => "0" })
}

/// Message settings row for a notification operation.
#[must_use]
pub fn message(subject: &str) -> Row {
    Row::new(fields! { "default_msg" => 0, "subject" => subject, "message" => "" })
}

/// Remote command operation targeting the given hosts and host groups.
#[must_use]
pub fn command_operation(scriptid: i64, hostids: &[i64], groupids: &[i64]) -> Row {
    operation(1)
        .with_children(
            ChildKind::OpCommand,
            vec![Row::new(fields! { "scriptid" => scriptid, "execute_on" => 0 })],
        )
        .with_children(
            ChildKind::OpCommandHost,
            hostids
                .iter()
                .map(|hostid| Row::new(fields! { "hostid" => *hostid }))
                .collect(),
        )
        .with_children(
            ChildKind::OpCommandGroup,
            groupids
                .iter()
                .map(|groupid| Row::new(fields! { "groupid" => *groupid }))
                .collect(),
        )
}

/// Tag row for any tag table.
#[must_use]
pub fn tag(tag: &str, value: &str) -> Row {
    Row::new(fields! { "tag" => tag, "value" => value })
}

/// Discovery rule override without a filter or operations.
#[must_use]
pub fn override_row(step: i64, name: &str) -> Row {
    Row::new(fields! { "step" => step, "name" => name })
}

/// Stored counterpart of a desired row, with children dropped.
#[must_use]
pub fn stored(id: i64, row: &Row) -> StoredRow {
    StoredRow::new(RowId::new(id), row.fields.clone())
}
