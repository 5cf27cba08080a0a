use crate::{
    config::Config,
    services::{BillingClient, HttpBillingClient, Orchestrator, SessionHub, SessionService},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub session_hub: Arc<SessionHub>,
    pub session_service: Arc<SessionService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let billing = Arc::new(HttpBillingClient::new(&config.billing)?);
        Ok(Self::with_billing(config, billing))
    }

    /// Build the state around an existing billing client
    pub fn with_billing(config: Config, billing: Arc<dyn BillingClient>) -> Self {
        let session_hub = Arc::new(SessionHub::new());
        let session_service = Arc::new(SessionService::new(&config.auth));

        let orchestrator = Arc::new(Orchestrator::new(
            billing,
            session_hub.clone(),
            &config.reconciliation,
            &config.checkout,
        ));

        Self {
            orchestrator,
            session_hub,
            session_service,
            config: Arc::new(config),
        }
    }
}
