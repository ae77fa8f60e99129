//! List / get / create / update / delete for every registered entity.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

use super::with_conn;
use crate::entities::{CreateRule, Entity};
use crate::error::AppError;
use crate::records::{self, Record};
use crate::registration;
use crate::server::SharedState;
use crate::{agents, students};

fn not_found() -> AppError {
    AppError::NotFound("Record not found".into())
}

/// Register the five CRUD routes of `entity` on `router`.
pub fn mount(router: Router<SharedState>, entity: &'static Entity) -> Router<SharedState> {
    let collection = format!("/api/{}", entity.route);
    let item = format!("/api/{}/{{id}}", entity.route);

    router
        .route(
            &collection,
            get(move |state: State<SharedState>| list_records(state, entity)).post(
                move |state: State<SharedState>, body: Json<Record>| {
                    create_record(state, entity, body)
                },
            ),
        )
        .route(
            &item,
            get(move |state: State<SharedState>, id: Path<String>| get_record(state, entity, id))
                .put(
                    move |state: State<SharedState>, id: Path<String>, body: Json<Record>| {
                        update_record(state, entity, id, body)
                    },
                )
                .delete(move |state: State<SharedState>, id: Path<String>| {
                    delete_record(state, entity, id)
                }),
        )
}

/// Create through the entity's create rule.
pub fn create_with_rule(
    conn: &Connection,
    entity: &'static Entity,
    body: &Record,
) -> Result<Record, AppError> {
    match entity.create_rule {
        CreateRule::Plain => records::create(conn, entity, body),
        CreateRule::Stage(stage) => registration::insert_stage_record(conn, stage, body),
        CreateRule::Student => students::add_student(conn, body),
        CreateRule::Agent => agents::add_agent(conn, body),
        CreateRule::AgentBonus => agents::add_agent_bonus(conn, body),
    }
}

/// Update under the same field rules the entity's create applies.
pub fn update_with_rule(
    conn: &Connection,
    entity: &'static Entity,
    id: &str,
    body: &Record,
) -> Result<Option<Record>, AppError> {
    match entity.create_rule {
        CreateRule::Stage(stage) => registration::update_stage_record(conn, stage, id, body),
        CreateRule::Student => students::update_student(conn, id, body),
        CreateRule::Agent => agents::update_agent(conn, id, body),
        CreateRule::Plain | CreateRule::AgentBonus => records::update(conn, entity, id, body),
    }
}

pub async fn list_records(
    State(state): State<SharedState>,
    entity: &'static Entity,
) -> Result<Json<Vec<Record>>, AppError> {
    let rows = with_conn(&state, |conn| records::list(conn, entity))?;
    Ok(Json(rows))
}

pub async fn get_record(
    State(state): State<SharedState>,
    entity: &'static Entity,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    with_conn(&state, |conn| records::get(conn, entity, &id))?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn create_record(
    State(state): State<SharedState>,
    entity: &'static Entity,
    Json(body): Json<Record>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let created = with_conn(&state, |conn| create_with_rule(conn, entity, &body))?;
    info!(
        table = entity.table,
        id = created.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
        "Record created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_record(
    State(state): State<SharedState>,
    entity: &'static Entity,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Result<Json<Record>, AppError> {
    let updated = with_conn(&state, |conn| update_with_rule(conn, entity, &id, &body))?;
    updated.map(Json).ok_or_else(not_found)
}

pub async fn delete_record(
    State(state): State<SharedState>,
    entity: &'static Entity,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !with_conn(&state, |conn| records::delete(conn, entity, &id))? {
        return Err(not_found());
    }
    info!(table = entity.table, id = %id, "Record deleted");
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/incomeoutcome/country/{country}`
pub async fn income_outcome_by_country(
    State(state): State<SharedState>,
    Path(country): Path<String>,
) -> Result<Json<Vec<Record>>, AppError> {
    let entity = crate::entities::by_table("income_outcome").ok_or_else(not_found)?;
    let rows = with_conn(&state, |conn| {
        records::list_where(conn, entity, "country", &country)
    })?;
    Ok(Json(rows))
}
