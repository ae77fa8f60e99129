use axum::{
    extract::{Path, State},
    Json,
};

use super::with_conn;
use crate::agents;
use crate::error::AppError;
use crate::records::Record;
use crate::server::SharedState;

/// `GET /api/agents/{id}/bonuses`
pub async fn agents_get_bonuses(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record>>, AppError> {
    let rows = with_conn(&state, |conn| agents::bonuses_for_agent(conn, &id))?;
    Ok(Json(rows))
}
