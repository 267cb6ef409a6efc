//! HTTP front end: the three tabs, the settings panel and image serving.

pub mod render;
mod routes;

pub use routes::SESSION_COOKIE;

use crate::config::StudioConfig;
use crate::error::Result;
use crate::gemini::{ClientFactory, GeminiClientFactory};
use crate::session::SessionStore;
use crate::store::ImageStore;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live browser sessions.
    pub sessions: Arc<SessionStore>,
    /// Builds a model client from a session's API key.
    pub clients: Arc<dyn ClientFactory>,
    /// Generated image directory.
    pub store: ImageStore,
    /// Where uploads are staged before being sent to the Files API.
    pub scratch_dir: PathBuf,
}

impl AppState {
    /// Wires the real Gemini client up according to `config`.
    pub fn from_config(config: &StudioConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(
                config.default_api_key.clone(),
                config.session_ttl,
            )),
            clients: Arc::new(GeminiClientFactory::new(
                config.model.clone(),
                config.base_url.clone(),
            )),
            store: ImageStore::new(config.output_dir.clone()),
            scratch_dir: config.scratch_dir.clone(),
        }
    }
}

/// Builds the application router.
///
/// Request bodies larger than `max_body_bytes` are rejected with 413.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    routes::routes()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the server until Ctrl-C.
pub async fn serve(config: StudioConfig) -> Result<()> {
    let state = AppState::from_config(&config);
    state.store.ensure_output_dir()?;

    let app = router(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        output_dir = %config.output_dir.display(),
        model = %config.model,
        "gemini studio listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::warn!("could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
