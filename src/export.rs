//! Excel export of one table.
//!
//! The sheet mirrors what the import loaders read: one header row using each
//! column's primary header, then one row per record in insertion order.

use rusqlite::Connection;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use tracing::info;

use crate::entities::Entity;
use crate::error::AppError;
use crate::records;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SHEET_NAME: &str = "Sheet1";

/// Current contents of `entity` as an `.xlsx` file.
pub fn export_entity(conn: &Connection, entity: &Entity) -> Result<Vec<u8>, AppError> {
    let rows = records::list(conn, entity)?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, column) in entity.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, column.header(), &bold)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        for (col, column) in entity.columns.iter().enumerate() {
            let c = col as u16;
            match row.get(&column.key()) {
                Some(Value::Number(n)) => {
                    sheet.write_number(r, c, n.as_f64().unwrap_or_default())?;
                }
                Some(Value::String(s)) if !s.is_empty() => {
                    sheet.write_string(r, c, s)?;
                }
                Some(Value::Bool(b)) => {
                    sheet.write_boolean(r, c, *b)?;
                }
                _ => {}
            }
        }
    }

    let bytes = workbook.save_to_buffer()?;
    info!(table = entity.table, rows = rows.len(), "Exported table");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::entities::{find, ENTITIES};
    use crate::import::run_loader;
    use serde_json::json;

    fn strip_ids(rows: Vec<records::Record>) -> Vec<records::Record> {
        rows.into_iter()
            .map(|mut r| {
                r.remove("id");
                r.remove("createdAt");
                r.remove("updatedAt");
                r
            })
            .collect()
    }

    #[test]
    fn test_export_then_import_reproduces_rows() {
        let source = db::init_in_memory().expect("source db");
        let salaries = find("salaries").expect("salaries");
        {
            let conn = source.lock();
            for (no, name, amount, date) in [
                (1, "Sara", 2500.5, "2025-01-31"),
                (2, "Omar", 3100.0, "2025-02-28"),
                (3, "Lina", 0.0, ""),
            ] {
                records::create(
                    &conn,
                    salaries,
                    &json!({ "no": no, "name": name, "amount": amount, "date": date })
                        .as_object()
                        .cloned()
                        .expect("object"),
                )
                .expect("create");
            }
        }

        let bytes = export_entity(&source.lock(), salaries).expect("export");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(salaries.export_file);
        std::fs::write(&path, bytes).expect("write export");

        let target = db::init_in_memory().expect("target db");
        let report = run_loader(&target.lock(), "salaries", &path, None).expect("reimport");
        assert_eq!(report.total_rows(), 3);

        let before = strip_ids(records::list(&source.lock(), salaries).expect("list"));
        let after = strip_ids(records::list(&target.lock(), salaries).expect("list"));
        assert_eq!(before, after);
    }

    #[test]
    fn test_every_table_exports_when_empty() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        for entity in ENTITIES {
            let bytes = export_entity(&conn, entity).expect(entity.table);
            assert!(bytes.starts_with(b"PK"), "{} is not a zip container", entity.table);
        }
    }
}
