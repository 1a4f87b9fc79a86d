//! Campus Portal - academic portal backend
//!
//! A Rust backend serving accounts, credit purchases, and
//! LLM-powered academic assistants.

mod api;
mod assistant;
mod auth;
mod config;
mod db;
mod llm;
mod markdown;
mod payments;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use llm::gemini::GeminiService;
use llm::LlmService;
use payments::StripeClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_portal=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    // Seed the admin account on first boot
    let admin_password = auth::hash_password(&config.seed_admin_password);
    if db.ensure_admin(
        &config.seed_admin_email,
        &admin_password.hash,
        &admin_password.salt,
    )? {
        tracing::info!(email = %config.seed_admin_email, "Seeded admin account");
    }

    let llm: Option<Arc<dyn LlmService>> = match &config.gemini_api_key {
        Some(key) => {
            let service = GeminiService::new(key.clone(), config.gemini_model.clone());
            tracing::info!(model = %service.model_id(), "Assistant enabled");
            Some(Arc::new(service))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not set. Assistant endpoints disabled.");
            None
        }
    };

    let stripe = match &config.stripe.secret_key {
        Some(key) => Some(Arc::new(StripeClient::new(key.clone()))),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set. Payment endpoints disabled.");
            None
        }
    };

    let port = config.port;
    let state = AppState::new(db, config, llm, stripe);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Campus portal listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
