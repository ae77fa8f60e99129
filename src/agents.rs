//! Sub-agents and the per-student bonuses they earn.

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::info;

use crate::entities::{self, Entity};
use crate::error::AppError;
use crate::records::{self, Record};

fn agent_entity() -> Result<&'static Entity, AppError> {
    entities::by_table("agent").ok_or_else(|| AppError::NotFound("Agent table is not registered".into()))
}

fn bonus_entity() -> Result<&'static Entity, AppError> {
    entities::by_table("agent_bonus")
        .ok_or_else(|| AppError::NotFound("Agent bonus table is not registered".into()))
}

fn str_field<'a>(payload: &'a Record, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .unwrap_or("")
}

/// Id of the agent whose name matches case-insensitively.
pub fn find_agent_id(conn: &Connection, name: &str) -> Result<Option<String>, AppError> {
    let id = conn
        .query_row(
            "SELECT id FROM agent WHERE name = ?1 COLLATE NOCASE",
            [name.trim()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn add_agent(conn: &Connection, payload: &Record) -> Result<Record, AppError> {
    let name = str_field(payload, &["name"]);
    if name.is_empty() {
        return Err(AppError::Validation("Agent name is required".into()));
    }
    if find_agent_id(conn, name)?.is_some() {
        return Err(AppError::Conflict("Agent with this name already exists".into()));
    }

    let mut body = Record::new();
    body.insert("name".into(), name.into());
    let agent = records::create(conn, agent_entity()?, &body)?;
    info!(agent = %name, "Agent added");
    Ok(agent)
}

/// Patch an agent. A name in the patch must be non-empty and not used by
/// another agent. `None` when no row has that id.
pub fn update_agent(
    conn: &Connection,
    id: &str,
    patch: &Record,
) -> Result<Option<Record>, AppError> {
    let mut patch = patch.clone();
    if let Some(raw) = patch.get("name") {
        let name = raw.as_str().map(str::trim).unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Agent name is required".into()));
        }
        if find_agent_id(conn, &name)?.is_some_and(|other| other != id) {
            return Err(AppError::Conflict("Agent with this name already exists".into()));
        }
        patch.insert("name".into(), name.into());
    }
    records::update(conn, agent_entity()?, id, &patch)
}

/// Existing agent id for `name`, creating the agent when missing.
pub fn ensure_agent(conn: &Connection, name: &str) -> Result<String, AppError> {
    if let Some(id) = find_agent_id(conn, name)? {
        return Ok(id);
    }
    let mut body = Record::new();
    body.insert("name".into(), name.trim().into());
    let agent = records::create(conn, agent_entity()?, &body)?;
    info!(agent = %name.trim(), "Created agent during import");
    Ok(agent
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Bonus rows of one agent; `NotFound` when the agent does not exist.
pub fn bonuses_for_agent(conn: &Connection, agent_id: &str) -> Result<Vec<Record>, AppError> {
    if records::get(conn, agent_entity()?, agent_id)?.is_none() {
        return Err(AppError::NotFound("Agent not found".into()));
    }
    records::list_where(conn, bonus_entity()?, "agent_id", agent_id)
}

/// Record a bonus against an existing agent. `enrollmentStatus` is accepted
/// in place of `enrollment`; `commissionFromUni` defaults to "0".
pub fn add_agent_bonus(conn: &Connection, payload: &Record) -> Result<Record, AppError> {
    let agent_id = str_field(payload, &["agentId", "agent_id"]).to_string();
    if agent_id.is_empty() {
        return Err(AppError::Validation("Agent ID is required".into()));
    }
    if str_field(payload, &["studentName", "student_name"]).is_empty() {
        return Err(AppError::Validation("studentName is required".into()));
    }
    if records::get(conn, agent_entity()?, &agent_id)?.is_none() {
        return Err(AppError::Validation("Agent not found".into()));
    }

    let mut body = payload.clone();
    body.insert("agentId".into(), agent_id.clone().into());
    body.remove("agent_id");
    if !body.contains_key("enrollment") {
        if let Some(status) = payload.get("enrollmentStatus").cloned() {
            body.insert("enrollment".into(), status);
        }
    }
    if !body.contains_key("commissionFromUni") && !body.contains_key("commission_from_uni") {
        body.insert("commissionFromUni".into(), "0".into());
    }

    let bonus = records::create(conn, bonus_entity()?, &body)?;
    info!(agent_id = %agent_id, "Agent bonus recorded");
    Ok(bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn body(value: Value) -> Record {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn test_agent_name_required_and_unique() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();

        let err = add_agent(&conn, &body(json!({ "name": "  " }))).expect_err("empty name");
        assert_eq!(err.to_string(), "Agent name is required");

        add_agent(&conn, &body(json!({ "name": "Mamoun" }))).expect("first");
        let err = add_agent(&conn, &body(json!({ "name": "mamoun" }))).expect_err("dup");
        assert_eq!(err.to_string(), "Agent with this name already exists");
    }

    #[test]
    fn test_ensure_agent_reuses_existing() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        let first = ensure_agent(&conn, "Sara").expect("create");
        let second = ensure_agent(&conn, "SARA").expect("reuse");
        assert_eq!(first, second);
    }

    #[test]
    fn test_bonus_requires_known_agent() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        let err = add_agent_bonus(&conn, &body(json!({ "studentName": "Ali" })))
            .expect_err("no agent id");
        assert_eq!(err.to_string(), "Agent ID is required");

        let err = add_agent_bonus(
            &conn,
            &body(json!({ "agentId": "missing", "studentName": "Ali" })),
        )
        .expect_err("unknown agent");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_bonuses_listed_per_agent() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        let omar = ensure_agent(&conn, "Omar").expect("omar");
        let dan = ensure_agent(&conn, "Dan").expect("dan");

        let bonus = add_agent_bonus(
            &conn,
            &body(json!({
                "agentId": omar,
                "studentName": "Ali",
                "enrollmentStatus": "Enrolled",
                "visaBonus": "150"
            })),
        )
        .expect("bonus");
        assert_eq!(bonus["enrollment"], json!("Enrolled"));
        assert_eq!(bonus["visaBonus"], json!(150.0));
        assert_eq!(bonus["commissionFromUni"], json!("0"));

        assert_eq!(bonuses_for_agent(&conn, &omar).expect("omar").len(), 1);
        assert!(bonuses_for_agent(&conn, &dan).expect("dan").is_empty());
        assert!(matches!(
            bonuses_for_agent(&conn, "nobody"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_keeps_agent_name_required_and_unique() {
        let state = db::init_in_memory().expect("db");
        let conn = state.lock();
        add_agent(&conn, &body(json!({ "name": "Rami" }))).expect("rami");
        let agent = add_agent(&conn, &body(json!({ "name": "Salma" }))).expect("salma");
        let id = agent["id"].as_str().expect("id");

        let err = update_agent(&conn, id, &body(json!({ "name": "  " }))).expect_err("blank");
        assert_eq!(err.to_string(), "Agent name is required");

        let err = update_agent(&conn, id, &body(json!({ "name": "RAMI" }))).expect_err("taken");
        assert_eq!(err.to_string(), "Agent with this name already exists");

        let same = update_agent(&conn, id, &body(json!({ "name": "salma " })))
            .expect("own name, different case")
            .expect("row exists");
        assert_eq!(same["name"], json!("salma"));

        assert!(update_agent(&conn, "missing", &body(json!({ "name": "Nobody" })))
            .expect("update")
            .is_none());
    }
}
