//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::sync::SyncManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    manager: SyncManager,
}

impl AppState {
    /// Create a new application state around a configured sync manager
    pub fn new(config: Config, manager: SyncManager) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, manager }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the sync manager
    pub fn manager(&self) -> &SyncManager {
        &self.inner.manager
    }
}
