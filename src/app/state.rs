//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Which store backend the sessions replicate through
    pub fn store_kind(&self) -> &'static str {
        if self.config.store_url.is_some() {
            "rest"
        } else {
            "memory"
        }
    }
}
