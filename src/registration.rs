//! Registration pipeline.
//!
//! A student moves through five stage tables. A passport number may sit in
//! at most one of them at a time; the guard below enforces that before every
//! stage insert made through the API.

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::with_transaction;
use crate::entities::{self, Entity};
use crate::error::AppError;
use crate::records::{self, Record};
use crate::students;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValApproved,
    Enrollment,
    VisaProcess,
    NotSubmitted,
    Cancelled,
}

impl Stage {
    /// Guard lookup order.
    pub const ALL: [Stage; 5] = [
        Stage::ValApproved,
        Stage::Enrollment,
        Stage::VisaProcess,
        Stage::NotSubmitted,
        Stage::Cancelled,
    ];

    pub const fn table(self) -> &'static str {
        match self {
            Stage::ValApproved => "registration_val_approved",
            Stage::Enrollment => "registration_enrollment",
            Stage::VisaProcess => "registration_visa_process",
            Stage::NotSubmitted => "registration_not_submitted",
            Stage::Cancelled => "registration_cancelled",
        }
    }

    /// Human-readable name, also stored as the row's stage tag and used as
    /// the sheet name in the registration workbook.
    pub const fn display_name(self) -> &'static str {
        match self {
            Stage::ValApproved => "Val Approved",
            Stage::Enrollment => "Enrollment",
            Stage::VisaProcess => "Visa Process",
            Stage::NotSubmitted => "Not Submitted",
            Stage::Cancelled => "Cancelled",
        }
    }

    pub const fn slug(self) -> &'static str {
        match self {
            Stage::ValApproved => "val-approved",
            Stage::Enrollment => "enrollment",
            Stage::VisaProcess => "visa-process",
            Stage::NotSubmitted => "not-submitted",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Parse a stage from its slug, display name or table name.
    /// Case, spaces, dashes and underscores are not significant.
    pub fn from_name(name: &str) -> Option<Stage> {
        let wanted = normalize(name);
        let wanted = wanted.strip_prefix("registration").unwrap_or(&wanted);
        Stage::ALL
            .into_iter()
            .find(|stage| normalize(stage.slug()) == wanted)
    }

    pub fn entity(self) -> Result<&'static Entity, AppError> {
        entities::by_table(self.table()).ok_or_else(|| {
            AppError::NotFound(format!("No table registered for {}", self.display_name()))
        })
    }

    fn valid_names() -> String {
        Stage::ALL
            .iter()
            .map(|s| s.slug())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse a stage name supplied by a client, with a 400 listing the valid
/// names on failure.
pub fn parse_stage(name: &str) -> Result<Stage, AppError> {
    Stage::from_name(name).ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid category {name}. Must be one of: {}",
            Stage::valid_names()
        ))
    })
}

/// Which stage tables the guard consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardScope {
    TargetStage,
    AllStages,
}

/// Whether `passport` has a row in `stage`.
pub fn passport_in_stage(conn: &Connection, passport: &str, stage: Stage) -> Result<bool, AppError> {
    let found: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE passport_number = ?1)",
            stage.table()
        ),
        [passport],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// The first stage, in [`Stage::ALL`] order, holding `passport`.
///
/// An empty passport never conflicts. Lookup failures are returned as
/// errors, never read as "no conflict".
pub fn find_conflicting_stage(
    conn: &Connection,
    passport: &str,
    target: Stage,
    scope: GuardScope,
) -> Result<Option<Stage>, AppError> {
    let passport = passport.trim();
    if passport.is_empty() {
        return Ok(None);
    }

    let only_target = [target];
    let stages: &[Stage] = match scope {
        GuardScope::TargetStage => &only_target,
        GuardScope::AllStages => &Stage::ALL,
    };

    for stage in stages {
        if passport_in_stage(conn, passport, *stage)? {
            return Ok(Some(*stage));
        }
    }
    Ok(None)
}

/// The stage currently holding `passport`, if any.
pub fn current_stage(conn: &Connection, passport: &str) -> Result<Option<Stage>, AppError> {
    find_conflicting_stage(conn, passport, Stage::ValApproved, GuardScope::AllStages)
}

/// Passport number as it is stored and guarded: strings trimmed, numbers
/// and booleans written out as text, null as empty. `None` for arrays and
/// objects, which column coercion rejects.
fn passport_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn raw_passport(payload: &Record) -> Option<&Value> {
    payload
        .get("passportNumber")
        .or_else(|| payload.get("passport_number"))
}

/// Passport number from a payload (`passportNumber` or `passport_number`),
/// normalized; empty when absent.
pub fn passport_from_payload(payload: &Record) -> String {
    raw_passport(payload)
        .and_then(passport_text)
        .unwrap_or_default()
}

/// Copy of `payload` whose passport, if present, sits under
/// `passportNumber` in normalized form.
pub fn with_normalized_passport(payload: &Record) -> Record {
    let mut out = payload.clone();
    let camel = out.remove("passportNumber");
    let snake = out.remove("passport_number");
    if let Some(raw) = camel.or(snake) {
        let value = passport_text(&raw).map(Value::String).unwrap_or(raw);
        out.insert("passportNumber".into(), value);
    }
    out
}

/// Insert a stage row after the all-stages guard, in one write transaction.
pub fn insert_stage_record(
    conn: &Connection,
    stage: Stage,
    payload: &Record,
) -> Result<Record, AppError> {
    let entity = stage.entity()?;
    let payload = with_normalized_passport(payload);
    let passport = passport_from_payload(&payload);
    let values = records::values_from_payload(entity, &payload)?;

    with_transaction(conn, |conn| {
        if let Some(existing) =
            find_conflicting_stage(conn, &passport, stage, GuardScope::AllStages)?
        {
            warn!(
                passport = %passport,
                target = stage.display_name(),
                existing = existing.display_name(),
                "Rejected duplicate registration"
            );
            return Err(AppError::Conflict(format!(
                "Student with this passport number already exists in {} records",
                existing.display_name()
            )));
        }

        if !passport.is_empty() && students::find_by_passport(conn, &passport)?.is_none() {
            warn!(
                passport = %passport,
                stage = stage.display_name(),
                "Passport is not on the student roster, registering anyway"
            );
        }

        let id = records::insert_row(conn, entity, &values)?;
        debug!(id = %id, stage = stage.display_name(), "Inserted registration record");
        records::get(conn, entity, &id)?
            .ok_or_else(|| AppError::NotFound("Record not found".into()))
    })
}

/// Update a stage row. A changed passport number must not already be held
/// by another row in any stage.
pub fn update_stage_record(
    conn: &Connection,
    stage: Stage,
    id: &str,
    patch: &Record,
) -> Result<Option<Record>, AppError> {
    let entity = stage.entity()?;
    let patch = with_normalized_passport(patch);
    let new_passport = raw_passport(&patch).map(|_| passport_from_payload(&patch));

    with_transaction(conn, |conn| {
        if let Some(passport) = new_passport.as_deref().filter(|p| !p.is_empty()) {
            for other in Stage::ALL {
                let held: bool = conn.query_row(
                    &format!(
                        "SELECT EXISTS(SELECT 1 FROM {} WHERE passport_number = ?1 AND id <> ?2)",
                        other.table()
                    ),
                    [passport, id],
                    |row| row.get(0),
                )?;
                if held {
                    return Err(AppError::Conflict(format!(
                        "Student with this passport number already exists in {} records",
                        other.display_name()
                    )));
                }
            }
        }
        records::update(conn, entity, id, &patch)
    })
}
