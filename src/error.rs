use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::ErrorCode;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_)
            | AppError::Workbook(_)
            | AppError::Config(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to API clients. Server-side failures are reduced to a
    /// generic string; the detail goes to the log instead.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_default();
                return match code.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        let target = detail
                            .split("failed: ")
                            .nth(1)
                            .unwrap_or("record")
                            .to_string();
                        AppError::Conflict(format!("Duplicate value for {target}"))
                    }
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => AppError::Conflict(
                        "Record references a missing row or is still referenced".to_string(),
                    ),
                    _ => AppError::Conflict(format!("Constraint violation: {detail}")),
                };
            }
        }
        AppError::Storage(err)
    }
}

impl From<calamine::Error> for AppError {
    fn from(err: calamine::Error) -> Self {
        AppError::Workbook(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Workbook(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (
            status,
            Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Workbook("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = AppError::Config("LEDGER_PORT is not a number".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::NotFound("Record not found".into());
        assert_eq!(err.public_message(), "Record not found");
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .expect("seed");
        let err: AppError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .expect_err("duplicate insert must fail")
            .into();
        match err {
            AppError::Conflict(msg) => assert!(msg.contains("t.v"), "unexpected message: {msg}"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_other_sqlite_errors_stay_storage() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let err: AppError = conn
            .execute("INSERT INTO missing_table VALUES (1)", [])
            .expect_err("missing table must fail")
            .into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
