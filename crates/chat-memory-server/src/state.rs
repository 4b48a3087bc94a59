use axum::extract::FromRef;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

use crate::config::Settings;
use crate::services::memory::SessionStore;
use crate::services::orchestrator::ChatOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub settings: Arc<Settings>,
    /// System info for RAM figures in the health report
    pub system: Arc<Mutex<System>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ChatOrchestrator>, settings: Settings) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
            settings: Arc::new(settings),
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl FromRef<AppState> for Arc<SessionStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
