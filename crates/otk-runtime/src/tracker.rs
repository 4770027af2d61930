//! Session factory shared by a host.

use std::sync::Arc;

use otk_client::{HttpOrderFetcher, OrderFetcher, PushTransport, WsPushTransport};
use otk_config::{TimingConfig, TrackerConfig};
use otk_schemas::Credential;

use crate::session::{SessionController, SessionDeps};

/// Holds the fetcher, push transport and timings; produces one
/// [`SessionController`] per tracked order.
#[derive(Clone)]
pub struct Tracker {
    deps: SessionDeps,
}

impl Tracker {
    pub fn new(
        fetcher: Arc<dyn OrderFetcher>,
        transport: Arc<dyn PushTransport>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            deps: SessionDeps {
                fetcher,
                transport,
                timing,
            },
        }
    }

    /// HTTP pull endpoint and WebSocket push channel from config.
    pub fn from_config(cfg: &TrackerConfig) -> Self {
        let fetcher = HttpOrderFetcher::new(cfg.api.rest_base_url.clone(), cfg.timing.connect_timeout);
        let transport = WsPushTransport::new(cfg.api.push_base_url.clone());
        Self::new(Arc::new(fetcher), Arc::new(transport), cfg.timing)
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.deps.timing
    }

    pub fn track(&self, order_id: impl Into<String>, credential: Credential) -> SessionController {
        SessionController::start(order_id, credential, &self.deps)
    }
}
