//! Bulk load of the final table into an analytical store.
//!
//! The store is a SQLite file holding one wide table that is dropped and
//! recreated on every load. Column types are inferred from the cells, and
//! anything null-like becomes SQL `NULL` before insertion.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDateTime};
use log::info;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};

use crate::{
    data::{Value, ValueKind, format_datetime, infer_kind},
    error::PipelineError,
    frame::Frame,
    io_utils,
    reconcile::columns,
};

/// Text that stands for a missing value after earlier stringification.
const NULL_LIKE: &[&str] = &["", "nan", "none", "nat", "<na>", "null"];

#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseColumn {
    pub name: String,
    pub kind: ValueKind,
}

impl WarehouseColumn {
    pub fn sql_type(&self) -> &'static str {
        match self.kind {
            ValueKind::Integer => "INTEGER",
            ValueKind::Float => "REAL",
            ValueKind::Timestamp => "TIMESTAMP",
            ValueKind::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseReport {
    pub table: String,
    pub columns: usize,
    pub rows_inserted: usize,
    pub rows_confirmed: usize,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn infer_columns(frame: &Frame) -> Vec<WarehouseColumn> {
    frame
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| WarehouseColumn {
            name: name.clone(),
            kind: infer_kind(frame.column_at(idx)),
        })
        .collect()
}

pub fn create_table_sql(table: &str, columns: &[WarehouseColumn]) -> String {
    let definitions = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", quote_ident(table))
}

fn in_range(dt: &NaiveDateTime) -> bool {
    (1..=9999).contains(&dt.year())
}

/// Converts a cell into its SQL value for a column of `kind`.
pub fn to_sql_value(cell: Option<&Value>, kind: ValueKind) -> SqlValue {
    let Some(value) = cell else {
        return SqlValue::Null;
    };
    match (kind, value) {
        (ValueKind::Integer, v) => v.as_i64().map_or(SqlValue::Null, SqlValue::Integer),
        (ValueKind::Float, v) => v.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        (ValueKind::Timestamp, Value::DateTime(dt)) if in_range(dt) => {
            SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        (ValueKind::Timestamp, _) => SqlValue::Null,
        (ValueKind::Text, Value::DateTime(dt)) => SqlValue::Text(format_datetime(dt)),
        (ValueKind::Text, v) => {
            let text = v.as_display();
            if NULL_LIKE.iter().any(|n| n.eq_ignore_ascii_case(text.trim())) {
                SqlValue::Null
            } else {
                SqlValue::Text(text)
            }
        }
    }
}

/// Drops and recreates `table` in the store at `path`, then inserts one row
/// per distinct unique row id.
pub fn load(frame: &Frame, path: &Path, table: &str) -> Result<WarehouseReport> {
    io_utils::ensure_parent_dir(path)?;
    let conn = Connection::open(path).map_err(|source| PipelineError::Warehouse {
        table: table.to_string(),
        column: None,
        source,
    })?;
    load_into(&conn, frame, table).with_context(|| format!("Loading warehouse {path:?}"))
}

pub fn load_into(conn: &Connection, frame: &Frame, table: &str) -> Result<WarehouseReport> {
    let orders = frame.dedup_by(columns::UNIQUE_ROW_ID);
    info!(
        "Loading {} distinct order row(s) into '{table}'",
        orders.len()
    );
    let wh_columns = infer_columns(&orders);
    let fail = || {
        let table = table.to_string();
        move |source: rusqlite::Error| PipelineError::Warehouse {
            table,
            column: None,
            source,
        }
    };

    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
        .map_err(fail())?;
    conn.execute_batch(&create_table_sql(table, &wh_columns))
        .map_err(fail())?;
    info!("Created '{table}' with {} column(s)", wh_columns.len());

    let placeholders = vec!["?"; wh_columns.len()].join(", ");
    let column_list = wh_columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_ident(table)
    );

    let tx = conn.unchecked_transaction().map_err(fail())?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(&insert).map_err(fail())?;
        for row in orders.rows() {
            let values = row
                .iter()
                .zip(&wh_columns)
                .map(|(cell, column)| to_sql_value(cell.as_ref(), column.kind));
            stmt.execute(params_from_iter(values)).map_err(|source| {
                let column = first_rejected_column(&source, table, &wh_columns);
                PipelineError::Warehouse {
                    table: table.to_string(),
                    column,
                    source,
                }
            })?;
            inserted += 1;
        }
    }
    tx.commit().map_err(fail())?;

    let confirmed: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )
        .map_err(fail())?;
    info!("Confirmed {confirmed} row(s) in '{table}'");

    Ok(WarehouseReport {
        table: table.to_string(),
        columns: wh_columns.len(),
        rows_inserted: inserted,
        rows_confirmed: usize::try_from(confirmed).unwrap_or_default(),
    })
}

/// Picks the column SQLite names as `table.column` in a constraint error,
/// if any.
fn first_rejected_column(
    err: &rusqlite::Error,
    table: &str,
    columns: &[WarehouseColumn],
) -> Option<String> {
    let message = err.to_string();
    let prefix = format!("{table}.");
    message
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|token| token.strip_prefix(prefix.as_str()))
        .find_map(|name| columns.iter().find(|c| c.name == name))
        .map(|c| c.name.clone())
}
