//! Workbook loaders.
//!
//! Each loader reads one workbook into one or more tables. Loaders append:
//! running one twice duplicates its rows. They write directly through the
//! repository, so the registration guard does not apply to seeded data.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agents;
use crate::db::with_transaction;
use crate::entities::{self, Column, Entity};
use crate::error::AppError;
use crate::records;
use crate::registration::Stage;

use super::workbook::{cell_value, Sheet, Workbook};

/// Workbooks read by `import-all`, by dataset, relative to the assets
/// directory. A workbook may feed several datasets.
pub const DEFAULT_WORKBOOKS: &[(&str, &str)] = &[
    ("abeer", "ABEER 2025.xlsx"),
    ("data", "DATA 2025.xlsx"),
    ("commission", "COMMISSION 24.xlsx"),
    ("invoice", "INVOICES.xlsx"),
    ("adv-bill", "ADV BILLS 2025 - 2026.xlsx"),
    ("bonus", "BONUS 2024.xlsx"),
    ("bonus-claimed", "BONUS 2024.xlsx"),
    ("bonus-not-claimed", "BONUS 2024.xlsx"),
    ("registration", "Registeration Form 2025.xlsx"),
    ("agent-bonus", "BONUS 2024.xlsx"),
];

#[derive(Debug)]
pub struct SheetReport {
    pub sheet: String,
    pub table: &'static str,
    pub rows: usize,
}

#[derive(Debug)]
pub struct ImportReport {
    pub dataset: String,
    pub workbook: PathBuf,
    pub sheets: Vec<SheetReport>,
    /// Sheets the loader looked for but did not find.
    pub skipped: Vec<String>,
}

impl ImportReport {
    fn new(dataset: &str, workbook: &Path) -> Self {
        Self {
            dataset: dataset.to_string(),
            workbook: workbook.to_path_buf(),
            sheets: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(|s| s.rows).sum()
    }

    fn skip(&mut self, sheet: &str) {
        info!(dataset = %self.dataset, sheet, "Sheet not found, skipping");
        self.skipped.push(sheet.to_string());
    }
}

/// Load `dataset` from the workbook at `path`. `sheet` selects the sheet for
/// single-sheet datasets (the first sheet otherwise).
pub fn run_loader(
    conn: &Connection,
    dataset: &str,
    path: &Path,
    sheet: Option<&str>,
) -> Result<ImportReport, AppError> {
    let dataset = dataset.trim().to_ascii_lowercase().replace('_', "-");
    let mut workbook = Workbook::open(path)?;
    let mut report = ImportReport::new(&dataset, path);

    info!(dataset = %dataset, workbook = %path.display(), "Import started");

    with_transaction(conn, |conn| {
        match dataset.as_str() {
            "commission" => load_commission(conn, &mut workbook, &mut report),
            "bonus-claimed" => load_bonus_claimed(conn, &mut workbook, &mut report),
            "bonus-not-claimed" => load_bonus_not_claimed(conn, &mut workbook, &mut report),
            "registration" => load_registration(conn, &mut workbook, &mut report),
            "agent-bonus" => load_agent_bonuses(conn, &mut workbook, &mut report),
            other => {
                let entity = entities::find(other).ok_or_else(|| {
                    AppError::Validation(format!("Unknown dataset {other}"))
                })?;
                load_single(conn, &mut workbook, &mut report, entity, sheet)
            }
        }
    })?;

    info!(
        dataset = %report.dataset,
        rows = report.total_rows(),
        skipped = report.skipped.len(),
        "Import finished"
    );
    Ok(report)
}

/// Run every loader in [`DEFAULT_WORKBOOKS`] against `assets_dir`. A failing
/// loader is logged and the rest still run.
pub fn run_all(conn: &Connection, assets_dir: &Path) -> Vec<(String, Result<ImportReport, AppError>)> {
    DEFAULT_WORKBOOKS
        .iter()
        .map(|(dataset, file)| {
            let result = run_loader(conn, dataset, &assets_dir.join(file), None);
            if let Err(e) = &result {
                warn!(dataset, error = %e, "Loader failed, continuing");
            }
            (dataset.to_string(), result)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn load_single(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
    entity: &'static Entity,
    sheet_name: Option<&str>,
) -> Result<(), AppError> {
    let sheet = match sheet_name {
        Some(name) => workbook.sheet(name)?,
        None => workbook.first_sheet()?,
    };
    match sheet {
        Some(sheet) => load_into(conn, report, &sheet, entity, &[]),
        None => {
            report.skip(sheet_name.unwrap_or("<first sheet>"));
            Ok(())
        }
    }
}

/// Every sheet is one month; the sheet name fills `month` and the currency
/// defaults to RM.
fn load_commission(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    let entity = entity("commission")?;
    for name in workbook.sheet_names() {
        let Some(sheet) = workbook.sheet(&name)? else {
            report.skip(&name);
            continue;
        };
        let fallbacks = [
            ("month", Value::from(name.as_str())),
            ("currency", Value::from("RM")),
        ];
        load_into(conn, report, &sheet, entity, &fallbacks)?;
    }
    Ok(())
}

fn is_claimed_sheet(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("claimed") && !lower.contains("not claimed")
}

fn is_not_claimed_sheet(name: &str) -> bool {
    name.to_lowercase().contains("not claimed")
}

fn load_bonus_claimed(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    let entity = entity("bonus_claimed")?;
    let Some(name) = workbook.sheet_names().into_iter().find(|n| is_claimed_sheet(n)) else {
        report.skip("claimed");
        return Ok(());
    };
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    if let Some(sheet) = workbook.sheet(&name)? {
        load_into(conn, report, &sheet, entity, &[("claimed_date", Value::from(today))])?;
    }
    Ok(())
}

fn load_bonus_not_claimed(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    let entity = entity("bonus_not_claimed")?;
    let Some(name) = workbook
        .sheet_names()
        .into_iter()
        .find(|n| is_not_claimed_sheet(n))
    else {
        report.skip("not claimed");
        return Ok(());
    };
    if let Some(sheet) = workbook.sheet(&name)? {
        load_into(conn, report, &sheet, entity, &[])?;
    }
    Ok(())
}

/// One sheet per stage, named after the stage. Val Approved rows are also
/// copied into the legacy registration table.
fn load_registration(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    for stage in Stage::ALL {
        let Some(sheet) = workbook.sheet(stage.display_name())? else {
            report.skip(stage.display_name());
            continue;
        };
        load_into(conn, report, &sheet, stage.entity()?, &[])?;
        if stage == Stage::ValApproved {
            load_into(conn, report, &sheet, entity("registration")?, &[])?;
        }
    }
    Ok(())
}

/// Every sheet after the first that is not a claimed/not-claimed sheet
/// belongs to one agent, named by the sheet. Agents are created on demand.
fn load_agent_bonuses(
    conn: &Connection,
    workbook: &mut Workbook,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    let entity = entity("agent_bonus")?;
    let agent_sheets: Vec<String> = workbook
        .sheet_names()
        .into_iter()
        .skip(1)
        .filter(|n| !n.to_lowercase().contains("claimed"))
        .collect();

    for name in agent_sheets {
        let Some(sheet) = workbook.sheet(&name)? else {
            report.skip(&name);
            continue;
        };
        let agent_id = agents::ensure_agent(conn, &name)?;
        let fallbacks = [
            ("agent_id", Value::from(agent_id)),
            ("commission_from_uni", Value::from("0")),
        ];
        load_into(conn, report, &sheet, entity, &fallbacks)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn entity(table: &str) -> Result<&'static Entity, AppError> {
    entities::by_table(table)
        .ok_or_else(|| AppError::Validation(format!("Unknown dataset {table}")))
}

/// Insert every data row of `sheet` into `entity`. `fallbacks` supply a
/// value for columns the sheet lacks or leaves empty.
fn load_into(
    conn: &Connection,
    report: &mut ImportReport,
    sheet: &Sheet,
    entity: &'static Entity,
    fallbacks: &[(&str, Value)],
) -> Result<(), AppError> {
    let indexes: Vec<Option<usize>> = entity
        .columns
        .iter()
        .map(|c| sheet.column_index(c.aliases))
        .collect();

    for (column, idx) in entity.columns.iter().zip(&indexes) {
        if idx.is_none() {
            debug!(sheet = %sheet.name, column = column.name, "No matching header");
        }
    }

    let mut inserted = 0;
    for row in sheet.rows() {
        let mut values = Vec::with_capacity(entity.columns.len());
        let mut has_data = false;

        for (column, idx) in entity.columns.iter().zip(&indexes) {
            let mut cell = idx.map_or(Value::Null, |i| cell_value(row, i));
            if !cell.is_null() {
                has_data = true;
            }
            if cell.is_null() {
                if let Some((_, fallback)) = fallbacks.iter().find(|(name, _)| *name == column.name) {
                    cell = fallback.clone();
                }
            }
            values.push(import_value(column, &cell, &sheet.name));
        }

        if !has_data {
            continue;
        }
        records::insert_row(conn, entity, &values)?;
        inserted += 1;
    }

    info!(sheet = %sheet.name, table = entity.table, rows = inserted, "Loaded sheet");
    report.sheets.push(SheetReport {
        sheet: sheet.name.clone(),
        table: entity.table,
        rows: inserted,
    });
    Ok(())
}

/// Lenient coercion: a cell that does not fit the column falls back to the
/// column default instead of failing the import.
fn import_value(column: &Column, cell: &Value, sheet: &str) -> SqlValue {
    records::coerce(column, cell).unwrap_or_else(|e| {
        debug!(sheet, column = column.name, error = %e, "Unusable cell, using default");
        records::default_value(column.kind)
    })
}
