//! [`Store`] implementation over a synchronous Postgres client.
//!
//! # Design
//! - Runs on whatever `GenericClient` the caller hands in, normally an open
//!   transaction; the store never commits or rolls back.
//! - Ids are reserved from the table's serial sequence before inserting, so
//!   every row is written with a known id and tokens map back without relying
//!   on `RETURNING` order.
//! - Selected rows are decoded generically; the id and parent columns are
//!   lifted out of the field map.

use std::collections::BTreeSet;

use postgres::types::{ToSql, Type};
use postgres::GenericClient;
use rowsync_model::{FieldValue, Fields, RowId, TableSpec};
use rowsync_reconcile::{
    Correlation, InsertRow, RowUpdate, SelectedRow, Store, StoreResult,
};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::sql::{self, Param};

/// Postgres-backed storage primitives.
pub struct PgStore<'a, C: GenericClient> {
    client: &'a mut C,
}

impl<'a, C: GenericClient> PgStore<'a, C> {
    /// Wrap a client or transaction.
    #[must_use]
    pub const fn new(client: &'a mut C) -> Self {
        Self { client }
    }

    /// Reserve `count` ids from the sequence behind `table`'s id column.
    ///
    /// # Errors
    ///
    /// Returns an error when the sequence cannot be read or hands out fewer
    /// ids than requested.
    pub fn reserve_ids(&mut self, table: &TableSpec, count: usize) -> Result<Vec<RowId>> {
        sql::quote(table.name)?;
        sql::quote(table.id_column)?;
        let wanted = i64::try_from(count).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(sql::RESERVE_IDS, &[&table.name, &table.id_column, &wanted])
            .map_err(query_failed("reserve ids"))?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<_, i64>(0).map(RowId::new))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_failed("reserve ids"))?;
        if ids.len() != count {
            return Err(DataError::IdReservation {
                requested: count,
                received: ids.len(),
            });
        }
        Ok(ids)
    }

    fn insert_rows(
        &mut self,
        table: &TableSpec,
        rows: &[InsertRow],
    ) -> Result<Vec<(Correlation, RowId)>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.reserve_ids(table, rows.len())?;

        let mut batches: Vec<(Vec<&str>, Vec<(RowId, &InsertRow)>)> = Vec::new();
        for (row, id) in rows.iter().zip(&ids) {
            let columns: Vec<&str> = row.fields.keys().map(String::as_str).collect();
            match batches.iter_mut().find(|(known, _)| *known == columns) {
                Some((_, members)) => members.push((*id, row)),
                None => batches.push((columns, vec![(*id, row)])),
            }
        }

        for (columns, members) in &batches {
            let width = sql::insert_columns(table, columns).len();
            for chunk in members.chunks(sql::rows_per_statement(width)) {
                let statement = sql::insert(table, columns, chunk)?;
                self.client
                    .execute(statement.text.as_str(), &bind(&statement.params))
                    .map_err(query_failed("insert"))?;
            }
        }
        debug!(
            table = table.name,
            rows = rows.len(),
            statements = batches.len(),
            "rows inserted"
        );
        Ok(rows.iter().map(|row| row.token).zip(ids).collect())
    }

    fn update_rows(&mut self, table: &TableSpec, rows: &[RowUpdate]) -> Result<()> {
        let mut applied = 0_usize;
        for row in rows.iter().filter(|row| !row.values.is_empty()) {
            let statement = sql::update(table, row)?;
            let affected = self
                .client
                .execute(statement.text.as_str(), &bind(&statement.params))
                .map_err(query_failed("update"))?;
            if affected == 0 {
                return Err(DataError::RowNotFound { id: row.id });
            }
            applied += 1;
        }
        debug!(table = table.name, rows = applied, "rows updated");
        Ok(())
    }

    fn delete_rows(&mut self, table: &TableSpec, ids: &[RowId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let text = sql::delete(table)?;
        let raw: Vec<i64> = ids.iter().copied().map(RowId::get).collect();
        let affected = self
            .client
            .execute(text.as_str(), &[&raw])
            .map_err(query_failed("delete"))?;
        debug!(table = table.name, requested = ids.len(), affected, "rows deleted");
        Ok(())
    }

    fn select_rows(&mut self, table: &TableSpec, parent_ids: &[RowId]) -> Result<Vec<SelectedRow>> {
        let text = sql::select(table)?;
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = parent_ids
            .iter()
            .copied()
            .map(RowId::get)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rows = self
            .client
            .query(text.as_str(), &[&raw])
            .map_err(query_failed("select"))?;
        let selected = rows
            .iter()
            .map(|row| decode_row(table, row))
            .collect::<Result<Vec<_>>>()?;
        debug!(table = table.name, rows = selected.len(), "rows selected");
        Ok(selected)
    }
}

impl<C: GenericClient> Store for PgStore<'_, C> {
    fn insert(
        &mut self,
        table: &TableSpec,
        rows: &[InsertRow],
    ) -> StoreResult<Vec<(Correlation, RowId)>> {
        self.insert_rows(table, rows)
            .map_err(|err| err.into_store_error("insert", table.name))
    }

    fn update(&mut self, table: &TableSpec, rows: &[RowUpdate]) -> StoreResult<()> {
        self.update_rows(table, rows)
            .map_err(|err| err.into_store_error("update", table.name))
    }

    fn delete(&mut self, table: &TableSpec, ids: &[RowId]) -> StoreResult<()> {
        self.delete_rows(table, ids)
            .map_err(|err| err.into_store_error("delete", table.name))
    }

    fn select(&mut self, table: &TableSpec, parent_ids: &[RowId]) -> StoreResult<Vec<SelectedRow>> {
        self.select_rows(table, parent_ids)
            .map_err(|err| err.into_store_error("select", table.name))
    }
}

fn query_failed(operation: &'static str) -> impl Fn(postgres::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

fn bind(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| match param {
            Param::Int(value) => value as &(dyn ToSql + Sync),
            Param::Text(value) => value as &(dyn ToSql + Sync),
        })
        .collect()
}

fn decode_row(table: &TableSpec, row: &postgres::Row) -> Result<SelectedRow> {
    let mut fields = Fields::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index, column.name(), column.type_())?;
        fields.insert(column.name().to_owned(), value);
    }
    let id = take_key(&mut fields, table.id_column)?;
    let parent_id = take_key(&mut fields, table.parent_column)?;
    Ok(SelectedRow {
        id,
        parent_id,
        fields,
    })
}

fn take_key(fields: &mut Fields, column: &'static str) -> Result<RowId> {
    match fields.remove(column) {
        Some(FieldValue::Int(value)) => Ok(RowId::new(value)),
        _ => Err(DataError::MissingKey { column }),
    }
}

fn decode_value(row: &postgres::Row, index: usize, name: &str, ty: &Type) -> Result<FieldValue> {
    let decoded = match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map(|value| value.map(|v| FieldValue::Int(i64::from(v)))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map(|value| value.map(|v| FieldValue::Int(i64::from(v)))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(index)
            .map(|value| value.map(FieldValue::Int)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(index)
            .map(|value| value.map(FieldValue::Text)),
        _ => {
            return Err(DataError::UnsupportedColumn {
                column: name.to_owned(),
                type_name: ty.name().to_owned(),
            });
        }
    };
    Ok(decoded
        .map_err(query_failed("decode"))?
        .unwrap_or(FieldValue::Null))
}
