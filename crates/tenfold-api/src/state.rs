//! Shared application state.

use std::sync::Arc;

use tenfold_engine::TurnOrchestrator;

use crate::auth::TokenAuthenticator;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub auth: Arc<TokenAuthenticator>,
    /// Shared secret for the admin surface; `None` disables it.
    pub admin_token: Option<String>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        auth: Arc<TokenAuthenticator>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            orchestrator,
            auth,
            admin_token,
        }
    }
}
