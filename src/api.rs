//! HTTP API for the campus portal

mod handlers;
mod types;

pub use handlers::create_router;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::assistant::catalog::Catalog;
use crate::assistant::session::ChatSession;
use crate::config::AppConfig;
use crate::db::Database;
use crate::llm::LlmService;
use crate::payments::StripeClient;

/// One live assistant session. The inner mutex serializes turns;
/// `try_lock` failing means a turn is already in flight.
pub struct SessionEntry {
    pub user_id: i64,
    /// Student sessions consume credits per turn, curriculum
    /// sessions do not.
    pub charges_credits: bool,
    pub session: Arc<tokio::sync::Mutex<ChatSession>>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub llm: Option<Arc<dyn LlmService>>,
    pub stripe: Option<Arc<StripeClient>>,
    pub catalog: Arc<Catalog>,
    pub sessions: Arc<RwLock<HashMap<String, Arc<SessionEntry>>>>,
}

impl AppState {
    pub fn new(
        db: Database,
        config: AppConfig,
        llm: Option<Arc<dyn LlmService>>,
        stripe: Option<Arc<StripeClient>>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            llm,
            stripe,
            catalog: Arc::new(Catalog::sample()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
