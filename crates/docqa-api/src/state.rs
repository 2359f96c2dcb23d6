//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use docqa_chat::QaOrchestrator;
use docqa_core::config::DocqaConfig;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. Nothing
/// here is mutated after startup.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<DocqaConfig>,
    pub orchestrator: Arc<QaOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: DocqaConfig, orchestrator: QaOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
