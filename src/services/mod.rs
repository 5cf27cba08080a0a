// Service modules
pub mod activation;
pub mod billing_client;
pub mod celebration_service;
pub mod entitlement_store;
pub mod navigation;
pub mod orchestrator;
pub mod reconciliation_service;
pub mod session_service;

pub use billing_client::{BillingClient, HttpBillingClient};
pub use celebration_service::CelebrationService;
pub use entitlement_store::EntitlementStore;
pub use orchestrator::Orchestrator;
pub use reconciliation_service::ReconciliationService;
pub use session_service::{AuthProvider, AuthSession, SessionHub, SessionService};
