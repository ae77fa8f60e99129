//! Spreadsheet reading on top of calamine.
//!
//! A [`Sheet`] is a header row plus data rows. Columns are located by
//! header alias, trimmed and compared case-insensitively, trying aliases in
//! priority order.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{Days, NaiveDate};
use serde_json::Value;

use crate::error::AppError;

/// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

pub struct Workbook {
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            return Err(AppError::Workbook(format!(
                "Workbook not found: {}",
                path.display()
            )));
        }
        let sheets = open_workbook_auto(path)?;
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Sheet by name. An exact match wins; otherwise names are compared
    /// trimmed and case-insensitively. `None` when no sheet matches.
    pub fn sheet(&mut self, name: &str) -> Result<Option<Sheet>, AppError> {
        let names = self.sheet_names();
        let found = names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| {
                names
                    .iter()
                    .find(|n| n.trim().eq_ignore_ascii_case(name.trim()))
            })
            .cloned();

        match found {
            Some(actual) => {
                let range = self.sheets.worksheet_range(&actual)?;
                Ok(Some(Sheet::from_range(&actual, &range)))
            }
            None => Ok(None),
        }
    }

    pub fn first_sheet(&mut self) -> Result<Option<Sheet>, AppError> {
        match self.sheet_names().into_iter().next() {
            Some(name) => self.sheet(&name),
            None => Ok(None),
        }
    }
}

pub struct Sheet {
    pub name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Data>>,
}

impl Sheet {
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header| header.iter().map(header_text).collect())
            .unwrap_or_default();
        let rows = rows
            .filter(|row| row.iter().any(|cell| !is_blank(cell)))
            .map(|row| row.to_vec())
            .collect();

        Self {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    /// Index of the first column whose header matches one of `aliases`,
    /// trying aliases in order.
    pub fn column_index(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            let wanted = alias.trim().to_lowercase();
            self.headers.iter().position(|h| *h == wanted)
        })
    }

    /// Data rows with blank rows removed.
    pub fn rows(&self) -> impl Iterator<Item = &[Data]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_lowercase(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_lowercase(),
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Cell at `idx` as JSON. Whole floats become integers so text columns do
/// not pick up a trailing `.0`; date cells become ISO dates.
pub fn cell_value(row: &[Data], idx: usize) -> Value {
    match row.get(idx) {
        None | Some(Data::Empty) | Some(Data::Error(_)) => Value::Null,
        Some(Data::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Value::Null
            } else {
                Value::String(s.to_string())
            }
        }
        Some(Data::Int(i)) => Value::from(*i),
        Some(Data::Float(f)) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Value::from(*f as i64)
            } else {
                Value::from(*f)
            }
        }
        Some(Data::Bool(b)) => Value::Bool(*b),
        Some(Data::DateTime(dt)) => excel_serial_to_iso(dt.as_f64())
            .map(Value::String)
            .unwrap_or(Value::Null),
        Some(Data::DateTimeIso(s)) => Value::String(s.chars().take(10).collect()),
        Some(Data::DurationIso(s)) => Value::String(s.clone()),
    }
}

/// Spreadsheet date serial to `YYYY-MM-DD`.
///
/// Serials count days from 1899-12-30 but the 1900 calendar wrongly
/// includes 1900-02-29 (serial 60). Serials 1..=59 therefore count from
/// 1899-12-31, and 60 is reported as 1900-02-28. Fractional time of day is
/// dropped. Returns `None` for serials outside the representable range.
pub fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || !(1.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    let days = serial.floor() as u64;
    let date = match days {
        60 => NaiveDate::from_ymd_opt(1900, 2, 28)?,
        1..=59 => NaiveDate::from_ymd_opt(1899, 12, 31)?.checked_add_days(Days::new(days))?,
        _ => NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(days))?,
    };
    Some(date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook as XlsxWorkbook;

    #[test]
    fn test_serial_to_iso() {
        assert_eq!(excel_serial_to_iso(45000.0).as_deref(), Some("2023-03-15"));
        assert_eq!(excel_serial_to_iso(45000.75).as_deref(), Some("2023-03-15"));
        assert_eq!(excel_serial_to_iso(1.0).as_deref(), Some("1900-01-01"));
        assert_eq!(excel_serial_to_iso(59.0).as_deref(), Some("1900-02-28"));
        assert_eq!(excel_serial_to_iso(60.0).as_deref(), Some("1900-02-28"));
        assert_eq!(excel_serial_to_iso(61.0).as_deref(), Some("1900-03-01"));
        assert_eq!(excel_serial_to_iso(25569.0).as_deref(), Some("1970-01-01"));
        assert_eq!(excel_serial_to_iso(0.0), None);
        assert_eq!(excel_serial_to_iso(-5.0), None);
        assert_eq!(excel_serial_to_iso(f64::NAN), None);
    }

    fn sample_sheet() -> Sheet {
        let mut range = Range::new((0, 0), (3, 3));
        range.set_value((0, 0), Data::String(" No ".into()));
        range.set_value((0, 1), Data::String("Student Name".into()));
        range.set_value((0, 2), Data::String("Name".into()));
        range.set_value((0, 3), Data::String("VISA ".into()));
        range.set_value((1, 0), Data::Float(1.0));
        range.set_value((1, 1), Data::String("Full Name".into()));
        range.set_value((1, 2), Data::String("Short".into()));
        range.set_value((1, 3), Data::Float(45000.0));
        // row 2 left blank
        range.set_value((3, 0), Data::Float(2.5));
        range.set_value((3, 2), Data::String("  ".into()));
        Sheet::from_range("Sheet1", &range)
    }

    #[test]
    fn test_aliases_resolve_in_priority_order() {
        let sheet = sample_sheet();
        assert_eq!(sheet.column_index(&["Name", "Student Name"]), Some(2));
        assert_eq!(sheet.column_index(&["Student Name", "Name"]), Some(1));
        assert_eq!(sheet.column_index(&["Visa"]), Some(3));
        assert_eq!(sheet.column_index(&["No.", "no"]), Some(0));
        assert_eq!(sheet.column_index(&["Passport"]), None);
    }

    #[test]
    fn test_blank_rows_skipped_and_cells_converted() {
        let sheet = sample_sheet();
        assert_eq!(sheet.row_count(), 2);
        let rows: Vec<_> = sheet.rows().collect();
        assert_eq!(cell_value(rows[0], 0), Value::from(1));
        assert_eq!(cell_value(rows[0], 1), Value::from("Full Name"));
        assert_eq!(cell_value(rows[1], 0), Value::from(2.5));
        assert_eq!(cell_value(rows[1], 1), Value::Null);
        assert_eq!(cell_value(rows[1], 2), Value::Null);
        assert_eq!(cell_value(rows[1], 9), Value::Null);
    }

    #[test]
    fn test_open_reads_sheets_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("book.xlsx");

        let mut book = XlsxWorkbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Val Approved").expect("name");
        sheet.write_string(0, 0, "Name").expect("write");
        sheet.write_string(1, 0, "Ali").expect("write");
        book.save(&path).expect("save");

        let mut workbook = Workbook::open(&path).expect("open");
        assert_eq!(workbook.sheet_names(), vec!["Val Approved".to_string()]);
        let sheet = workbook
            .sheet("val approved")
            .expect("read")
            .expect("case-insensitive match");
        assert_eq!(sheet.name, "Val Approved");
        assert_eq!(sheet.row_count(), 1);
        assert!(workbook.sheet("Enrollment").expect("read").is_none());
    }

    #[test]
    fn test_missing_workbook_is_workbook_error() {
        let err = Workbook::open(Path::new("/nonexistent/book.xlsx"))
            .err()
            .expect("missing file");
        assert!(matches!(err, AppError::Workbook(_)));
    }
}
