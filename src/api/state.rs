//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthState;
use crate::chat::StreamOrchestrator;
use crate::db::Database;
use crate::provider::ProviderRegistry;
use crate::session::{SessionRepository, SessionService};
use crate::user::{UserRepository, UserService};

/// Shared state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthState,
    pub users: UserService,
    pub sessions: SessionService,
    pub orchestrator: StreamOrchestrator,
}

impl AppState {
    pub fn new(
        db: Database,
        auth: AuthState,
        registry: Arc<ProviderRegistry>,
        pacing: Duration,
    ) -> Self {
        let session_repo = SessionRepository::new(db.pool().clone());
        Self {
            auth,
            users: UserService::new(UserRepository::new(db.pool().clone())),
            sessions: SessionService::new(session_repo.clone()),
            orchestrator: StreamOrchestrator::new(session_repo, registry, pacing),
            db,
        }
    }
}
