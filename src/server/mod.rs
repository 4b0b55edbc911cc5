mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::CONTENT_TYPE, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::core::errors::Result;
use crate::store::MenuStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MenuStore>,
}

/// Build the HTTP surface: a health route plus one route per scenario.
pub fn router(store: Arc<MenuStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/test", get(handlers::health))
        .route(
            "/api/test/concurrency/dirty-read",
            get(handlers::dirty_read),
        )
        .route(
            "/api/test/concurrency/non-repeatable-read",
            get(handlers::non_repeatable_read),
        )
        .route(
            "/api/test/concurrency/lost-update",
            get(handlers::lost_update),
        )
        .fallback(handlers::not_found)
        .layer(cors)
        .with_state(AppState { store })
}

/// Serve the trial API until Ctrl+C or SIGTERM.
pub async fn start_server(addr: &str, store: Arc<MenuStore>) -> Result<()> {
    let app = router(store);
    let listener = TcpListener::bind(addr).await?;
    info!("server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
