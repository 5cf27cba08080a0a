use crate::{
    config::{CheckoutConfig, ReconciliationConfig},
    error::{ApiError, Result},
    models::{
        billing::{RedirectUrl, TrialActivation},
        entitlement::EntitlementView,
    },
    services::{
        billing_client::BillingClient,
        celebration_service::CelebrationService,
        entitlement_store::EntitlementStore,
        navigation::{CheckoutMarker, Navigator},
        reconciliation_service::{ReconcileOutcome, ReconciliationService, RetryPolicy},
        session_service::{AuthProvider, AuthSession},
    },
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Shown after a manual restore whatever the outcome was
pub const RESTORE_CONFIRMATION: &str =
    "Purchases restored. Any active subscription is now applied to your account.";

#[derive(Default)]
struct Tasks {
    session_watch: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

/// Composition root for entitlement reconciliation and the celebration.
///
/// Owns the session's [`EntitlementStore`]; the reconciler and the celebration
/// are the only writers, everything else reads through [`view`](Self::view).
pub struct Orchestrator {
    store: EntitlementStore,
    reconciler: ReconciliationService,
    celebration: CelebrationService,
    auth: Arc<dyn AuthProvider>,
    billing: Arc<dyn BillingClient>,
    checkout_marker: CheckoutMarker,
    config: ReconciliationConfig,
    tasks: Mutex<Tasks>,
}

impl Orchestrator {
    pub fn new(
        billing: Arc<dyn BillingClient>,
        auth: Arc<dyn AuthProvider>,
        config: &ReconciliationConfig,
        checkout: &CheckoutConfig,
    ) -> Self {
        let store = EntitlementStore::new();
        let reconciler = ReconciliationService::new(
            Arc::clone(&billing),
            store.clone(),
            RetryPolicy::from_config(config),
        );
        let celebration = CelebrationService::new(store.clone());

        Self {
            store,
            reconciler,
            celebration,
            auth,
            billing,
            checkout_marker: CheckoutMarker::from_config(checkout),
            config: config.clone(),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &EntitlementStore {
        &self.store
    }

    pub fn celebration(&self) -> &CelebrationService {
        &self.celebration
    }

    /// Everything presentation renders, read in one go
    pub fn view(&self) -> EntitlementView {
        let state = self.store.state();
        let run = self.celebration.current();
        EntitlementView {
            snapshot: state.snapshot,
            is_reconciling: state.is_reconciling,
            has_completed_initial_check: state.has_completed_initial_check,
            celebration_phase: run.phase,
            affirmation_index: run.affirmation_index,
        }
    }

    /// Begin following auth-session changes (and polling while signed in)
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.watch_sessions().await });
        if let Some(previous) = self.tasks().session_watch.replace(handle) {
            previous.abort();
        }
    }

    /// Tear everything down. A running celebration is cancelled, not completed.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks();
        let handles = tasks
            .session_watch
            .take()
            .into_iter()
            .chain(tasks.poll.take())
            .chain(tasks.background.drain(..));
        for handle in handles {
            handle.abort();
        }
        drop(tasks);

        self.celebration.cancel();
        info!("Entitlement orchestrator stopped");
    }

    async fn watch_sessions(self: Arc<Self>) {
        let mut rx = self.auth.subscribe();
        let mut current: Option<Uuid> = None;

        let initial = rx.borrow_and_update().clone();
        self.on_session_changed(&mut current, initial);

        while rx.changed().await.is_ok() {
            let session = rx.borrow_and_update().clone();
            self.on_session_changed(&mut current, session);
        }
        debug!("Auth provider closed, session watcher exiting");
    }

    fn on_session_changed(self: &Arc<Self>, current: &mut Option<Uuid>, session: Option<AuthSession>) {
        let next = session.as_ref().map(|s| s.user_id);

        match (*current, next) {
            (None, None) => {}
            (Some(previous), Some(user)) if previous == user => {
                debug!(user_id = %user, "Session token refreshed");
            }
            (None, Some(user)) => {
                info!(user_id = %user, "Session established");
                self.store.bind_identity(user);
                self.start_polling();
            }
            (Some(previous), next) => {
                info!(previous = %previous, next = ?next, "Session identity changed");
                self.stop_polling();
                self.celebration.cancel();
                self.store.reset_for_identity(next);
                if next.is_some() {
                    self.start_polling();
                }
            }
        }

        *current = next;
    }

    fn start_polling(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = self.config.poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick is immediate: the establishment check
                ticker.tick().await;
                this.reconcile_now().await;
            }
        });

        if let Some(previous) = self.tasks().poll.replace(handle) {
            previous.abort();
        }
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.tasks().poll.take() {
            handle.abort();
        }
    }

    /// Reconcile with the current session and start a celebration on activation
    pub async fn reconcile_now(&self) -> ReconcileOutcome {
        let session = self.auth.current_session();
        self.reconcile_with(session.as_ref()).await
    }

    async fn reconcile_with(&self, session: Option<&AuthSession>) -> ReconcileOutcome {
        let outcome = self.reconciler.reconcile(session).await;
        match outcome {
            ReconcileOutcome::Activated => {
                info!("Premium newly activated, starting celebration");
                self.celebration.trigger();
            }
            // Token lapsed for a bound user: the store restarted the session
            ReconcileOutcome::SignedOut if self.store.identity().is_some() => {
                self.celebration.reset();
            }
            _ => {}
        }
        outcome
    }

    /// Manual "restore purchases". Always answers with the same confirmation.
    #[instrument(skip(self))]
    pub async fn restore_purchases(&self) -> &'static str {
        let outcome = self.reconcile_now().await;
        info!(outcome = ?outcome, "Manual restore finished");
        RESTORE_CONFIRMATION
    }

    /// Handle the return from a successful checkout.
    ///
    /// Returns false when the location carries no checkout-success marker.
    #[instrument(skip(self, navigator))]
    pub fn handle_checkout_return(self: &Arc<Self>, navigator: &dyn Navigator) -> bool {
        let location = navigator.current_location();
        let Some(cleaned) = self.checkout_marker.strip(&location) else {
            return false;
        };

        // Strip first so back/refresh cannot replay the marker
        navigator.replace_location(cleaned);
        self.store.apply_optimistic_premium();
        self.celebration.trigger();
        info!("Checkout return detected, premium applied optimistically");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.reconcile_when_session_ready().await;
        });

        let mut tasks = self.tasks();
        tasks.background.retain(|task| !task.is_finished());
        tasks.background.push(handle);
        true
    }

    /// Wait for a usable session, then confirm entitlement with billing.
    ///
    /// Gives up after the configured timeout; the next regular reconciliation
    /// corrects the optimistic state in that case.
    pub async fn reconcile_when_session_ready(&self) -> Option<ReconcileOutcome> {
        let deadline = Instant::now() + self.config.session_wait_timeout();
        loop {
            if let Some(session) = self.auth.current_session().filter(AuthSession::is_valid) {
                let outcome = self.reconcile_with(Some(&session)).await;
                info!(outcome = ?outcome, "Checkout entitlement confirmed in background");
                return Some(outcome);
            }

            if Instant::now() >= deadline {
                warn!(
                    waited_secs = self.config.session_wait_timeout_secs,
                    "No session appeared after checkout return, skipping confirmation"
                );
                return None;
            }

            tokio::time::sleep(self.config.session_wait_poll()).await;
        }
    }

    pub fn complete_celebration(&self) -> Result<()> {
        self.celebration.complete()
    }

    fn require_session(&self) -> Result<AuthSession> {
        self.auth
            .current_session()
            .filter(AuthSession::is_valid)
            .ok_or_else(|| ApiError::Unauthorized("No active session".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn open_customer_portal(&self) -> Result<RedirectUrl> {
        let session = self.require_session()?;
        Ok(self.billing.open_customer_portal(&session.access_token).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_checkout_session(&self) -> Result<RedirectUrl> {
        let session = self.require_session()?;
        Ok(self
            .billing
            .create_checkout_session(&session.access_token)
            .await?)
    }

    /// Redeem a promo code; a successful activation is reconciled right away
    #[instrument(skip(self, promo_code))]
    pub async fn activate_trial(&self, promo_code: &str) -> Result<TrialActivation> {
        let promo_code = promo_code.trim();
        if promo_code.is_empty() {
            return Err(ApiError::BadRequest("Promo code is required".to_string()));
        }

        let session = self.require_session()?;
        let activation = self
            .billing
            .activate_trial(&session.access_token, promo_code)
            .await?;

        if activation.success {
            info!(user_id = %session.user_id, "Trial activated");
            self.reconcile_with(Some(&session)).await;
        } else {
            info!(
                user_id = %session.user_id,
                reason = ?activation.error,
                "Trial activation rejected"
            );
        }

        Ok(activation)
    }
}
