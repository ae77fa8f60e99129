//! Read-only registration pipeline queries.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::with_conn;
use crate::error::AppError;
use crate::registration::{self, GuardScope};
use crate::server::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStudentQuery {
    #[serde(default, alias = "passport", alias = "passport_number")]
    pub passport_number: Option<String>,
    #[serde(default, alias = "stage")]
    pub category: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ---- Commands ----

/// `GET /api/registration/check-student`: is the passport already in the
/// given stage?
pub async fn registration_check_student(
    State(state): State<SharedState>,
    Query(query): Query<CheckStudentQuery>,
) -> Result<Json<Value>, AppError> {
    let (Some(passport), Some(category)) = (
        non_blank(&query.passport_number),
        non_blank(&query.category),
    ) else {
        return Err(AppError::Validation(
            "Passport number and category are required".into(),
        ));
    };
    let stage = registration::parse_stage(category)?;

    let found = with_conn(&state, |conn| {
        registration::find_conflicting_stage(conn, passport, stage, GuardScope::TargetStage)
    })?;
    Ok(Json(json!({ "exists": found.is_some() })))
}

/// `GET /api/registration/stage-of`
pub async fn registration_stage_of(
    State(state): State<SharedState>,
    Query(query): Query<CheckStudentQuery>,
) -> Result<Json<Value>, AppError> {
    let passport = non_blank(&query.passport_number)
        .ok_or_else(|| AppError::Validation("Passport number is required".into()))?;
    let stage = with_conn(&state, |conn| registration::current_stage(conn, passport))?;
    Ok(Json(json!({ "stage": stage.map(|s| s.display_name()) })))
}
