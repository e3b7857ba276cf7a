use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::availability::AvailabilityStore;
use crate::services::conversation::ConversationStore;
use crate::services::orchestrator::Orchestrator;

pub struct AppState {
    pub config: AppConfig,
    pub availability: Arc<AvailabilityStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub orchestrator: Orchestrator,
}
