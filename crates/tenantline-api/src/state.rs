//! Application state shared across all route handlers.
//!
//! AppState holds the call manager, the property index and the registry feed.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use tenantline_core::config::TenantlineConfig;
use tenantline_dialogue::CallManager;
use tenantline_registry::{PropertyIndex, RegistryFeed};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup.
    pub config: Arc<TenantlineConfig>,
    /// Live calls and collaborator dispatch.
    pub manager: Arc<CallManager>,
    /// Property registry shared with the dialogue controller.
    pub index: Arc<PropertyIndex>,
    /// Source used by `POST /registry/reload`. `None` disables reloading.
    pub feed: Option<Arc<dyn RegistryFeed>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: TenantlineConfig,
        manager: CallManager,
        feed: Option<Arc<dyn RegistryFeed>>,
    ) -> Self {
        let index = Arc::clone(manager.controller().index());
        Self {
            config: Arc::new(config),
            manager: Arc::new(manager),
            index,
            feed,
            start_time: Instant::now(),
        }
    }
}
