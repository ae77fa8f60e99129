//! Generic record repository.
//!
//! One implementation of list / get / create / update / delete serves every
//! table in the entity registry. Rows travel as JSON objects keyed by the
//! camelCase column name, with `id` and any system columns alongside.

use chrono::Utc;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::entities::{camel_case, Column, ColumnKind, Entity, SystemColumns};
use crate::error::AppError;
use crate::import::workbook::excel_serial_to_iso;

/// A row as exposed by the API.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn select_list(entity: &Entity) -> String {
    let mut cols = vec!["id"];
    cols.extend(entity.columns.iter().map(|c| c.name));
    cols.extend(entity.system_columns());
    cols.join(", ")
}

/// All rows in insertion order.
pub fn list(conn: &Connection, entity: &Entity) -> Result<Vec<Record>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        select_list(entity),
        entity.table
    );
    query_records(conn, entity, &sql, [])
}

/// Rows whose `column` equals `value` exactly.
pub fn list_where(
    conn: &Connection,
    entity: &Entity,
    column: &str,
    value: &str,
) -> Result<Vec<Record>, AppError> {
    if entity.column(column).is_none() {
        return Err(AppError::Validation(format!(
            "Unknown column {column} for {}",
            entity.table
        )));
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {column} = ?1 ORDER BY rowid",
        select_list(entity),
        entity.table
    );
    query_records(conn, entity, &sql, [value])
}

pub fn get(conn: &Connection, entity: &Entity, id: &str) -> Result<Option<Record>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        select_list(entity),
        entity.table
    );
    Ok(query_records(conn, entity, &sql, [id])?.into_iter().next())
}

fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    entity: &Entity,
    sql: &str,
    params: P,
) -> Result<Vec<Record>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(row_to_record(entity, row)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

fn row_to_record(entity: &Entity, row: &Row<'_>) -> Result<Record, AppError> {
    let mut record = Record::new();
    let id: String = row.get(0)?;
    record.insert("id".to_string(), Value::String(id));

    let mut idx = 1;
    for column in entity.columns {
        record.insert(column.key(), cell_to_json(row.get_ref(idx)?));
        idx += 1;
    }
    for name in entity.system_columns() {
        record.insert(camel_case(name), cell_to_json(row.get_ref(idx)?));
        idx += 1;
    }
    Ok(record)
}

fn cell_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a row built from a JSON payload. Missing fields take their kind's
/// default. Returns the stored row.
pub fn create(conn: &Connection, entity: &Entity, payload: &Record) -> Result<Record, AppError> {
    let values = values_from_payload(entity, payload)?;
    let id = insert_row(conn, entity, &values)?;
    get(conn, entity, &id)?.ok_or_else(|| AppError::NotFound("Record not found".into()))
}

/// Insert one row. `values` is aligned with `entity.columns`. The id, the
/// stage tag and the timestamps are always supplied here, never by callers.
pub fn insert_row(
    conn: &Connection,
    entity: &Entity,
    values: &[SqlValue],
) -> Result<String, AppError> {
    debug_assert_eq!(values.len(), entity.columns.len());

    let id = Uuid::new_v4().to_string();
    let mut names: Vec<&str> = vec!["id"];
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(id.clone())];

    for (column, value) in entity.columns.iter().zip(values) {
        names.push(column.name);
        params.push(value.clone());
    }

    match entity.system {
        SystemColumns::None => {}
        SystemColumns::StageTag => {
            let tag = entity
                .stage()
                .map(|s| s.display_name())
                .unwrap_or("Val Approved");
            names.push("sheet_type");
            params.push(SqlValue::Text(tag.to_string()));
        }
        SystemColumns::Timestamps => {
            let now = Utc::now().to_rfc3339();
            names.push("created_at");
            params.push(SqlValue::Text(now.clone()));
            names.push("updated_at");
            params.push(SqlValue::Text(now));
        }
    }

    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity.table,
        names.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(params))?;
    Ok(id)
}

/// Merge the recognised fields of `patch` into the row. `None` when no row
/// has that id.
pub fn update(
    conn: &Connection,
    entity: &Entity,
    id: &str,
    patch: &Record,
) -> Result<Option<Record>, AppError> {
    let mut assignments = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    for column in entity.columns {
        if let Some(value) = payload_value(patch, column) {
            params.push(coerce(column, value)?);
            assignments.push(format!("{} = ?{}", column.name, params.len()));
        }
    }
    if entity.system == SystemColumns::Timestamps {
        params.push(SqlValue::Text(Utc::now().to_rfc3339()));
        assignments.push(format!("updated_at = ?{}", params.len()));
    }

    if assignments.is_empty() {
        return get(conn, entity, id);
    }

    params.push(SqlValue::Text(id.to_string()));
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        entity.table,
        assignments.join(", "),
        params.len()
    );
    let changed = conn.execute(&sql, params_from_iter(params))?;
    if changed == 0 {
        return Ok(None);
    }
    get(conn, entity, id)
}

/// Remove a row. `false` when no row has that id.
pub fn delete(conn: &Connection, entity: &Entity, id: &str) -> Result<bool, AppError> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", entity.table),
        [id],
    )?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Payload coercion
// ---------------------------------------------------------------------------

/// Look up a column in a payload by camelCase key, then by column name.
pub fn payload_value<'a>(payload: &'a Record, column: &Column) -> Option<&'a Value> {
    payload
        .get(&column.key())
        .or_else(|| payload.get(column.name))
}

/// Values for every column of `entity`, in column order.
pub fn values_from_payload(entity: &Entity, payload: &Record) -> Result<Vec<SqlValue>, AppError> {
    entity
        .columns
        .iter()
        .map(|column| match payload_value(payload, column) {
            Some(value) => coerce(column, value),
            None => Ok(default_value(column.kind)),
        })
        .collect()
}

pub fn default_value(kind: ColumnKind) -> SqlValue {
    match kind {
        ColumnKind::Integer => SqlValue::Integer(0),
        ColumnKind::Real => SqlValue::Real(0.0),
        ColumnKind::Text | ColumnKind::Date => SqlValue::Text(String::new()),
    }
}

/// Convert one JSON value to the SQL value stored for `column`.
pub fn coerce(column: &Column, value: &Value) -> Result<SqlValue, AppError> {
    let invalid = || {
        AppError::Validation(format!(
            "Field {} expects a number, got {value}",
            column.key()
        ))
    };

    match column.kind {
        ColumnKind::Integer => match value {
            Value::Null => Ok(SqlValue::Integer(0)),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .map(SqlValue::Integer)
                .ok_or_else(invalid),
            Value::String(s) if s.trim().is_empty() => Ok(SqlValue::Integer(0)),
            Value::String(s) => parse_number(s)
                .map(|f| SqlValue::Integer(f.round() as i64))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        ColumnKind::Real => match value {
            Value::Null => Ok(SqlValue::Real(0.0)),
            Value::Bool(b) => Ok(SqlValue::Real(if *b { 1.0 } else { 0.0 })),
            Value::Number(n) => n.as_f64().map(SqlValue::Real).ok_or_else(invalid),
            Value::String(s) if s.trim().is_empty() => Ok(SqlValue::Real(0.0)),
            Value::String(s) => parse_number(s).map(SqlValue::Real).ok_or_else(invalid),
            _ => Err(invalid()),
        },
        ColumnKind::Date => match value {
            Value::Number(n) => Ok(SqlValue::Text(
                n.as_f64()
                    .and_then(excel_serial_to_iso)
                    .unwrap_or_else(|| n.to_string()),
            )),
            other => text_value(column, other),
        },
        ColumnKind::Text => text_value(column, value),
    }
}

fn text_value(column: &Column, value: &Value) -> Result<SqlValue, AppError> {
    match value {
        Value::Null => Ok(SqlValue::Text(String::new())),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
        Value::Bool(b) => Ok(SqlValue::Text(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(AppError::Validation(format!(
            "Field {} expects a text value",
            column.key()
        ))),
    }
}

/// Parse a human-entered amount: thousands separators and a leading
/// currency code or symbol are tolerated (`RM1,500.00`, `$ 20`).
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}
