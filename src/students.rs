//! Student roster, keyed by passport number.

use rusqlite::Connection;
use tracing::info;

use crate::entities::{self, Entity};
use crate::error::AppError;
use crate::records::{self, Record};
use crate::registration::{passport_from_payload, with_normalized_passport};

fn entity() -> Result<&'static Entity, AppError> {
    entities::by_table("student")
        .ok_or_else(|| AppError::NotFound("Student table is not registered".into()))
}

pub fn find_by_passport(conn: &Connection, passport: &str) -> Result<Option<Record>, AppError> {
    let passport = passport.trim();
    if passport.is_empty() {
        return Ok(None);
    }
    Ok(records::list_where(conn, entity()?, "passport_number", passport)?
        .into_iter()
        .next())
}

pub fn exists(conn: &Connection, passport: &str) -> Result<bool, AppError> {
    Ok(find_by_passport(conn, passport)?.is_some())
}

/// Add a student to the roster. The passport number is required and must
/// not already be on file.
pub fn add_student(conn: &Connection, payload: &Record) -> Result<Record, AppError> {
    let passport = passport_from_payload(payload);
    if passport.is_empty() {
        return Err(AppError::Validation("Passport number is required".into()));
    }
    if exists(conn, &passport)? {
        return Err(AppError::Conflict(
            "Student already exists with this passport number".into(),
        ));
    }

    let student = records::create(conn, entity()?, &with_normalized_passport(payload))?;
    info!(passport = %passport, "Student added to roster");
    Ok(student)
}

/// Patch a roster row. A passport in the patch must be non-empty and not
/// held by another student. `None` when no row has that id.
pub fn update_student(
    conn: &Connection,
    id: &str,
    patch: &Record,
) -> Result<Option<Record>, AppError> {
    let patch = with_normalized_passport(patch);
    if patch.contains_key("passportNumber") {
        let passport = passport_from_payload(&patch);
        if passport.is_empty() {
            return Err(AppError::Validation("Passport number is required".into()));
        }
        let held_elsewhere: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM student WHERE passport_number = ?1 AND id <> ?2)",
            [passport.as_str(), id],
            |row| row.get(0),
        )?;
        if held_elsewhere {
            return Err(AppError::Conflict(
                "Student already exists with this passport number".into(),
            ));
        }
    }
    records::update(conn, entity()?, id, &patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Record {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn test_add_and_find_student() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();

        let created = add_student(
            &conn,
            &body(json!({ "passportNumber": " N998877 ", "name": "Lina", "uni": "UCSI" })),
        )
        .expect("add");
        assert_eq!(created["passportNumber"], json!("N998877"));

        let found = find_by_passport(&conn, "N998877")
            .expect("lookup")
            .expect("found");
        assert_eq!(found["name"], json!("Lina"));
        assert!(exists(&conn, "N998877").expect("exists"));
        assert!(!exists(&conn, "X0").expect("exists"));
    }

    #[test]
    fn test_passport_required() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        let err = add_student(&conn, &body(json!({ "name": "No Passport" })))
            .expect_err("missing passport");
        assert_eq!(err.to_string(), "Passport number is required");
    }

    #[test]
    fn test_duplicate_passport_rejected() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        add_student(&conn, &body(json!({ "passport_number": "D1" }))).expect("first");
        let err = add_student(&conn, &body(json!({ "passportNumber": "D1" })))
            .expect_err("duplicate");
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "Student already exists with this passport number"
        );
    }

    #[test]
    fn test_numeric_passport_accepted() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        let created = add_student(&conn, &body(json!({ "passportNumber": 87654321 })))
            .expect("numeric passport");
        assert_eq!(created["passportNumber"], json!("87654321"));
        assert!(exists(&conn, "87654321").expect("exists"));
    }

    #[test]
    fn test_update_keeps_passport_required_and_unique() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        add_student(&conn, &body(json!({ "passportNumber": "U1" }))).expect("u1");
        let second = add_student(&conn, &body(json!({ "passportNumber": "U2" }))).expect("u2");
        let id = second["id"].as_str().expect("id");

        let err = update_student(&conn, id, &body(json!({ "passportNumber": "  " })))
            .expect_err("blank passport");
        assert_eq!(err.to_string(), "Passport number is required");

        let err = update_student(&conn, id, &body(json!({ "passport_number": "U1" })))
            .expect_err("taken passport");
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = update_student(
            &conn,
            id,
            &body(json!({ "passportNumber": " U3 ", "name": "Moved" })),
        )
        .expect("update")
        .expect("row exists");
        assert_eq!(updated["passportNumber"], json!("U3"));
        assert_eq!(updated["name"], json!("Moved"));

        let renamed = update_student(&conn, id, &body(json!({ "uni": "APU" })))
            .expect("update without passport")
            .expect("row exists");
        assert_eq!(renamed["passportNumber"], json!("U3"));
    }
}
