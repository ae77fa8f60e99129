//! Router assembly and the HTTP listener.

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::signal::ctrl_c;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::commands::{self, agents, export, records, registration, students};
use crate::config::Config;
use crate::db::DbState;
use crate::entities::ENTITIES;
use crate::error::AppError;

pub struct AppState {
    pub db: DbState,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbState) -> SharedState {
        Arc::new(Self { db })
    }
}

/// Every route of the API bound to `state`.
pub fn build_router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(commands::health))
        .route("/api/students/search", get(students::students_search))
        .route(
            "/api/students/check-passport",
            get(students::students_check_passport),
        )
        .route(
            "/api/registration/check-student",
            get(registration::registration_check_student),
        )
        .route(
            "/api/registration/stage-of",
            get(registration::registration_stage_of),
        )
        .route(
            "/api/incomeoutcome/country/{country}",
            get(records::income_outcome_by_country),
        )
        .route("/api/agents/{id}/bonuses", get(agents::agents_get_bonuses))
        .route("/api/export/{dataset}", get(export::export_dataset));

    for entity in ENTITIES {
        router = records::mount(router, entity);
    }

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `config.address()` and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &Config, state: SharedState) -> Result<(), AppError> {
    let address = config.address();
    let listener = TcpListener::bind(&address).await?;
    info!(address = %address, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use axum::{body::Body, http::Request, http::StatusCode};
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tower::ServiceExt;
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

    #[derive(Clone)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_requests_logged_under_default_filter() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let writer = Capture(captured.clone());
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(crate::DEFAULT_LOG_FILTER))
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone()),
            );
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = build_router(AppState::new(db::init_in_memory().expect("db")));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let logged = String::from_utf8(captured.lock().expect("capture lock").clone())
            .expect("utf8 log");
        assert!(logged.contains("finished processing request"), "{logged}");
        assert!(logged.contains("/api/health"), "{logged}");
        assert!(logged.contains("status=200"), "{logged}");
        assert!(logged.contains("latency="), "{logged}");
    }
}
