//! HTTP handlers.
//!
//! Handlers lock the connection, run one repository operation and return.
//! No guard is held across an await point.

pub mod agents;
pub mod export;
pub mod records;
pub mod registration;
pub mod students;

use axum::Json;
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::server::AppState;

/// Run `f` against the shared connection.
pub(crate) fn with_conn<T>(
    state: &AppState,
    f: impl FnOnce(&Connection) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let conn = state.db.lock();
    f(&conn)
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
