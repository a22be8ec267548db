//! Identifier checks and statement text for the Postgres store.
//!
//! # Design
//! - Table and column names come from static table specs and row field maps;
//!   only plain lowercase identifiers are accepted and every one is quoted.
//! - Values are bound as parameters with explicit casts. `NULL` is inlined so
//!   untyped nulls never reach the driver.

use once_cell::sync::OnceCell;
use regex::Regex;
use rowsync_model::{FieldValue, RowId, TableSpec};
use rowsync_reconcile::{InsertRow, RowUpdate};

use crate::error::{DataError, Result};

/// Bind parameter limit of the Postgres wire protocol.
pub const MAX_PARAMS: usize = 65_535;

/// Reserve `$3` ids from the serial sequence behind column `$2` of table `$1`.
pub const RESERVE_IDS: &str =
    "SELECT nextval(pg_get_serial_sequence($1, $2)) FROM generate_series(1, $3::int8)";

static IDENTIFIER: OnceCell<Regex> = OnceCell::new();

/// Value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Bound as `int8`.
    Int(i64),
    /// Bound as `text`.
    Text(String),
}

/// Statement text with its parameters in `$n` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    /// SQL text.
    pub text: String,
    /// Parameters referenced by the text.
    pub params: Vec<Param>,
}

impl Statement {
    fn bind(&mut self, value: &FieldValue) -> String {
        match value {
            FieldValue::Null => "NULL".to_owned(),
            FieldValue::Int(value) => {
                self.params.push(Param::Int(*value));
                format!("${}::int8", self.params.len())
            }
            FieldValue::Text(value) => {
                self.params.push(Param::Text(value.clone()));
                format!("${}::text", self.params.len())
            }
        }
    }
}

/// Quote `identifier` after checking it is a plain lowercase name.
///
/// # Errors
///
/// Returns [`DataError::InvalidIdentifier`] for anything else.
pub fn quote(identifier: &str) -> Result<String> {
    let pattern = IDENTIFIER
        .get_or_try_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$"))
        .map_err(|source| DataError::PatternCompile { source })?;
    if pattern.is_match(identifier) {
        Ok(format!("\"{identifier}\""))
    } else {
        Err(DataError::InvalidIdentifier {
            identifier: identifier.to_owned(),
        })
    }
}

/// Rows of `width` parameters that fit in one statement.
#[must_use]
pub const fn rows_per_statement(width: usize) -> usize {
    let rows = MAX_PARAMS / if width == 0 { 1 } else { width };
    if rows == 0 { 1 } else { rows }
}

/// Columns written for every row of an insert batch, keys first.
#[must_use]
pub fn insert_columns<'a>(table: &'a TableSpec, fields: &'a [&'a str]) -> Vec<&'a str> {
    let mut columns = vec![table.id_column];
    if table.has_parent() {
        columns.push(table.parent_column);
    }
    columns.extend(fields.iter().copied());
    columns
}

/// Multi-row insert of `rows` with explicit ids.
///
/// Every row is written with the same `fields` column list; columns a row
/// lacks are written as `NULL`.
///
/// # Errors
///
/// Returns [`DataError::InvalidIdentifier`] for unsafe table or column names.
pub fn insert(table: &TableSpec, fields: &[&str], rows: &[(RowId, &InsertRow)]) -> Result<Statement> {
    let columns = insert_columns(table, fields)
        .into_iter()
        .map(quote)
        .collect::<Result<Vec<_>>>()?;
    let mut statement = Statement::default();
    let mut tuples = Vec::with_capacity(rows.len());
    for (id, row) in rows {
        let mut values = vec![statement.bind(&FieldValue::from(*id))];
        if table.has_parent() {
            values.push(statement.bind(&FieldValue::from(row.parent_id)));
        }
        for field in fields {
            values.push(statement.bind(row.fields.get(*field).unwrap_or(&FieldValue::Null)));
        }
        tuples.push(format!("({})", values.join(", ")));
    }
    statement.text = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote(table.name)?,
        columns.join(", "),
        tuples.join(", ")
    );
    Ok(statement)
}

/// Sparse update of one row.
///
/// # Errors
///
/// Returns [`DataError::InvalidIdentifier`] for unsafe table or column names.
pub fn update(table: &TableSpec, row: &RowUpdate) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut assignments = Vec::with_capacity(row.values.len());
    for (column, value) in &row.values {
        let target = quote(column)?;
        assignments.push(format!("{target} = {}", statement.bind(value)));
    }
    let id = statement.bind(&FieldValue::from(row.id));
    statement.text = format!(
        "UPDATE {} SET {} WHERE {} = {id}",
        quote(table.name)?,
        assignments.join(", "),
        quote(table.id_column)?
    );
    Ok(statement)
}

/// Delete by an `int8[]` of ids bound as `$1`.
///
/// # Errors
///
/// Returns [`DataError::InvalidIdentifier`] for unsafe table names.
pub fn delete(table: &TableSpec) -> Result<String> {
    Ok(format!(
        "DELETE FROM {} WHERE {} = ANY($1::int8[])",
        quote(table.name)?,
        quote(table.id_column)?
    ))
}

/// Select every row owned by an `int8[]` of parents bound as `$1`, ordered by id.
///
/// # Errors
///
/// Returns [`DataError::NoParentColumn`] for root tables and
/// [`DataError::InvalidIdentifier`] for unsafe names.
pub fn select(table: &TableSpec) -> Result<String> {
    if !table.has_parent() {
        return Err(DataError::NoParentColumn);
    }
    let id = quote(table.id_column)?;
    Ok(format!(
        "SELECT * FROM {} WHERE {} = ANY($1::int8[]) ORDER BY {id}",
        quote(table.name)?,
        quote(table.parent_column)?
    ))
}
