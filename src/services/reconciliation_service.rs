use crate::{
    config::ReconciliationConfig,
    error::BillingError,
    models::entitlement::EntitlementSnapshot,
    services::{
        billing_client::BillingClient,
        entitlement_store::{EntitlementStore, SettleOutcome, WriteTicket},
        session_service::AuthSession,
    },
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};

/// Bounded retry for billing calls that race session hydration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ReconciliationConfig) -> Self {
        Self {
            max_retries: config.auth_retry_attempts,
            delay: Duration::from_millis(config.auth_retry_delay_ms),
        }
    }

    pub fn should_retry(&self, err: &BillingError, retries_so_far: u32) -> bool {
        err.is_recoverable() && retries_so_far < self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No valid session; entitlement reset to the signed-out default
    SignedOut,
    Applied,
    /// Fresh premium activation, withheld until the celebration completes
    Activated,
    /// Celebration already pending for this activation
    Withheld,
    /// Result arrived after a newer write and was discarded
    Stale,
    /// Billing call failed; previous snapshot kept
    Retained,
}

impl From<SettleOutcome> for ReconcileOutcome {
    fn from(outcome: SettleOutcome) -> Self {
        match outcome {
            SettleOutcome::Applied => ReconcileOutcome::Applied,
            SettleOutcome::Activated => ReconcileOutcome::Activated,
            SettleOutcome::Withheld => ReconcileOutcome::Withheld,
            SettleOutcome::Stale => ReconcileOutcome::Stale,
        }
    }
}

/// Marks a reconciliation as in flight for as long as it lives.
///
/// Dropping it (normally or because the future was cancelled) always clears
/// the store's reconciling flag.
struct InFlight<'a> {
    store: &'a EntitlementStore,
    ticket: WriteTicket,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.finish_reconcile(self.ticket, self.settled);
    }
}

pub struct ReconciliationService {
    billing: Arc<dyn BillingClient>,
    store: EntitlementStore,
    retry: RetryPolicy,
}

impl ReconciliationService {
    pub fn new(billing: Arc<dyn BillingClient>, store: EntitlementStore, retry: RetryPolicy) -> Self {
        Self {
            billing,
            store,
            retry,
        }
    }

    pub fn store(&self) -> &EntitlementStore {
        &self.store
    }

    /// Fetch the authoritative entitlement and merge it into the store.
    ///
    /// Never fails: billing errors leave the stored snapshot untouched.
    #[instrument(skip(self, session))]
    pub async fn reconcile(&self, session: Option<&AuthSession>) -> ReconcileOutcome {
        let session = match session {
            Some(session) if session.is_valid() => session,
            _ => {
                info!("No valid session, resetting entitlement to signed-out");
                self.store.apply_signed_out();
                return ReconcileOutcome::SignedOut;
            }
        };

        let mut in_flight = InFlight {
            store: &self.store,
            ticket: self.store.begin_reconcile(),
            settled: false,
        };

        let result = self.fetch_with_retry(session).await;
        in_flight.settled = true;

        match result {
            Ok(snapshot) => {
                let is_premium = snapshot.is_premium;
                let active_trial = snapshot.has_active_trial();
                let outcome = ReconcileOutcome::from(self.store.settle(in_flight.ticket, snapshot));
                info!(
                    user_id = %session.user_id,
                    is_premium = is_premium,
                    active_trial = active_trial,
                    outcome = ?outcome,
                    "Entitlement reconciled"
                );
                outcome
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    user_id = %session.user_id,
                    retries = self.retry.max_retries,
                    "Billing still reports no auth session, keeping previous entitlement: {}",
                    e
                );
                ReconcileOutcome::Retained
            }
            Err(e) => {
                error!(
                    user_id = %session.user_id,
                    "Entitlement check failed, keeping previous entitlement: {}",
                    e
                );
                ReconcileOutcome::Retained
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        session: &AuthSession,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let mut retries = 0;
        loop {
            match self.billing.check_entitlement(&session.access_token).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if self.retry.should_retry(&e, retries) => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        token = %session.fingerprint(),
                        "Auth session not visible to billing yet, retrying in {:?}",
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
