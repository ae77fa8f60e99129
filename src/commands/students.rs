//! Student roster lookups.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::with_conn;
use crate::error::AppError;
use crate::records::Record;
use crate::server::SharedState;
use crate::students;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportQuery {
    #[serde(default, alias = "passport", alias = "passport_number")]
    pub passport_number: Option<String>,
}

impl PassportQuery {
    /// Trimmed passport number, or a 400 when it is absent or blank.
    pub fn required(&self) -> Result<String, AppError> {
        self.passport_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Passport number is required".into()))
    }
}

// ---- Commands ----

/// `GET /api/students/search`
pub async fn students_search(
    State(state): State<SharedState>,
    Query(query): Query<PassportQuery>,
) -> Result<Json<Record>, AppError> {
    let passport = query.required()?;
    with_conn(&state, |conn| students::find_by_passport(conn, &passport))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Student not found".into()))
}

/// `GET /api/students/check-passport`
pub async fn students_check_passport(
    State(state): State<SharedState>,
    Query(query): Query<PassportQuery>,
) -> Result<Json<Value>, AppError> {
    let passport = query.required()?;
    let exists = with_conn(&state, |conn| students::exists(conn, &passport))?;
    Ok(Json(json!({ "exists": exists })))
}
