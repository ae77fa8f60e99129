use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use super::with_conn;
use crate::entities;
use crate::error::AppError;
use crate::export::{self, XLSX_CONTENT_TYPE};
use crate::server::SharedState;

/// `GET /api/export/{dataset}`: the table as an `.xlsx` attachment.
pub async fn export_dataset(
    State(state): State<SharedState>,
    Path(dataset): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entities::find(&dataset)
        .ok_or_else(|| AppError::NotFound(format!("Unknown dataset {dataset}")))?;
    let bytes = with_conn(&state, |conn| export::export_entity(conn, entity))?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", entity.export_file),
            ),
        ],
        bytes,
    ))
}
