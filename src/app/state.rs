//! Application state shared across relay routes

use std::sync::Arc;

use crate::config::Config;
use crate::relay::MemoryRelay;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: MemoryRelay,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            relay: MemoryRelay::new(),
        }
    }
}
