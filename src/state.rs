use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::conversation::BookingOrchestrator;
use crate::services::otp::InboundMailbox;
use crate::services::sessions::SessionStore;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: BookingOrchestrator,
    pub sessions: SessionStore,
    pub mailbox: Arc<InboundMailbox>,
}
