//! DocSign API Server - Backend for envelope signing
//!
//! Provides REST endpoints for:
//! - Envelope, recipient and field management (owner side)
//! - Signing links and value submission (recipient side)
//! - Signed-PDF composition and delivery once everyone has signed

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

mod blob;
mod config;
mod email;
mod error;
mod handlers;
mod models;
mod state;
mod store;

#[cfg(test)]
mod tests;

use config::Config;
use state::AppState;

/// Full router over shared state
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let blobs = ServeDir::new(state.blobs.root());
    let body_limit = state.config.body_limit();

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Owner endpoints
        .route(
            "/api/envelopes",
            get(handlers::list_envelopes).post(handlers::create_envelope),
        )
        .route(
            "/api/envelopes/:id",
            get(handlers::get_envelope)
                .patch(handlers::patch_envelope)
                .delete(handlers::delete_envelope),
        )
        .route("/api/envelopes/:id/upload", post(handlers::upload_pdf))
        .route("/api/envelopes/:id/recipients", put(handlers::put_recipients))
        .route("/api/envelopes/:id/fields", put(handlers::put_fields))
        .route("/api/envelopes/:id/send", post(handlers::send_envelope))
        .route("/api/envelopes/:id/links", get(handlers::signing_links))
        .route("/api/envelopes/:id/download", get(handlers::download))
        // Signer endpoints
        .route(
            "/api/sign/:token",
            get(handlers::get_signing_view).post(handlers::submit_signature),
        )
        // Stored documents
        .nest_service(blob::BLOB_ROUTE, blobs)
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docsign_api=info".parse()?)
                .add_directive("docsign_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Initialize application state
    info!("Initializing DocSign API...");
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config).await?);
    if !state.mailer.is_enabled() {
        info!("RESEND_API_KEY not set, emails will be logged instead of sent");
    }

    info!("Starting DocSign API on http://{}", addr);
    info!("Serving blobs from {}", state.blobs.root().display());

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
