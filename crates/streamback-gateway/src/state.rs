//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use streamback_core::StreamRegistry;
use streamback_core::config::Config;
use streamback_core::layout::ComponentNode;

use crate::session::SessionSettings;

/// Shared gateway state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<StreamRegistry>,
    pub settings: SessionSettings,
    /// Route path of the streaming endpoint, always starting with `/`.
    pub endpoint: String,
    /// Application layout served by `/layout`, before connector injection.
    pub layout: Vec<ComponentNode>,
    pub active_sessions: AtomicU64,
    pub sessions_total: AtomicU64,
    pub started_at: DateTime<Utc>,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, registry: Arc<StreamRegistry>) -> Self {
        let settings = SessionSettings::from_config(&config);
        let endpoint = normalize_endpoint(&config.endpoint());
        Self {
            config,
            registry,
            settings,
            endpoint,
            layout: Vec::new(),
            active_sessions: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            started_at: Utc::now(),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_layout(mut self, layout: Vec<ComponentNode>) -> Self {
        self.layout = layout;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Count a session in; the returned guard counts it out on drop.
    pub fn begin_session(self: &Arc<Self>) -> SessionGuard {
        self.active_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_total.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::record_session_start();
        SessionGuard {
            state: Arc::clone(self),
        }
    }

    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.load(Ordering::SeqCst)
    }
}

pub struct SessionGuard {
    state: Arc<GatewayState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        streamback_core::protocol::DEFAULT_ENDPOINT.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
