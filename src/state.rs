use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::conversation::ConversationLog;
use crate::engine::dispatcher::RideDispatcher;
use crate::engine::driver_pool::DriverPool;
use crate::engine::pricing::PricingEngine;
use crate::engine::session::{RideSession, SessionSettings, SessionSnapshot};
use crate::error::AppError;
use crate::geo::provider::GeoRouting;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub pool: Arc<DriverPool>,
    pub dispatcher: Arc<RideDispatcher>,
    pub conversations: Arc<ConversationLog>,
    pub pricing: Arc<PricingEngine>,
    pub geo: Arc<dyn GeoRouting>,
    pub sessions: DashMap<Uuid, Arc<RideSession>>,
    pub session_settings: SessionSettings,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, geo: Arc<dyn GeoRouting>) -> Result<Self, AppError> {
        let metrics = Metrics::new();
        let pool = Arc::new(DriverPool::new());
        let conversations = Arc::new(ConversationLog::new(config.event_buffer_size));
        let dispatcher = Arc::new(RideDispatcher::new(
            pool.clone(),
            conversations.clone(),
            metrics.clone(),
            config.event_buffer_size,
        ));

        Ok(Self {
            pool,
            dispatcher,
            conversations,
            pricing: Arc::new(PricingEngine::from_config(config)?),
            geo,
            sessions: DashMap::new(),
            session_settings: SessionSettings {
                search_radius_meters: config.search_radius_meters,
                candidate_limit: config.candidate_limit,
                provider_timeout: Duration::from_millis(config.provider_timeout_ms),
                event_buffer_size: config.event_buffer_size,
            },
            metrics,
        })
    }

    pub fn open_session(&self, rider_id: &str) -> Result<Arc<RideSession>, AppError> {
        let session = Arc::new(RideSession::new(
            rider_id,
            self.geo.clone(),
            self.pricing.clone(),
            self.dispatcher.clone(),
            self.session_settings.clone(),
            self.metrics.clone(),
        )?);
        self.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    pub fn session(&self, session_id: Uuid) -> Result<Arc<RideSession>, AppError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))
    }

    /// Drops a session from the registry once it has completed or been
    /// cancelled.
    pub fn retire_if_finished(&self, snapshot: &SessionSnapshot) {
        if snapshot.state.is_terminal() && self.sessions.remove(&snapshot.id).is_some() {
            info!(session_id = %snapshot.id, state = ?snapshot.state, "session retired");
        }
    }

    /// Syncs every session with its ride and drops those that reached a
    /// terminal state, e.g. through the acceptance timeout. Returns how many
    /// were dropped.
    pub fn prune_finished_sessions(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.sync() {
            Ok(snapshot) => !snapshot.state.is_terminal(),
            Err(_) => false,
        });
        before.saturating_sub(self.sessions.len())
    }
}
