use crate::support::{
    auth_missing, expired_session, free, premium, session, FakeBilling,
};
use entitlement_orchestrator::{
    services::{
        reconciliation_service::{ReconcileOutcome, RetryPolicy},
        EntitlementStore, ReconciliationService,
    },
    BillingError,
};
use futures::future::join;
use std::time::Duration;
use tokio::time::Instant;

fn service(billing: &std::sync::Arc<FakeBilling>) -> (ReconciliationService, EntitlementStore) {
    let store = EntitlementStore::new();
    let service = ReconciliationService::new(billing.clone(), store.clone(), RetryPolicy::default());
    (service, store)
}

#[tokio::test(start_paused = true)]
async fn test_auth_missing_exhausts_retries_and_keeps_snapshot() {
    let billing = FakeBilling::new(Err(auth_missing()));
    billing.push(Ok(premium()));
    let (service, store) = service(&billing);
    let session = session();

    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Applied);
    let before = store.snapshot();
    assert!(before.is_premium);

    let started = Instant::now();
    let outcome = service.reconcile(Some(&session)).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, ReconcileOutcome::Retained);
    assert_eq!(store.snapshot(), before);
    assert!(!store.is_reconciling());
    // One initial attempt plus three retries, two seconds apart
    assert_eq!(billing.checks(), 1 + 4);
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_when_session_becomes_visible() {
    let billing = FakeBilling::new(Ok(free()));
    billing.push(Err(auth_missing()));
    billing.push(Err(auth_missing()));
    billing.push(Ok(premium()));
    let (service, store) = service(&billing);

    let started = Instant::now();
    let outcome = service.reconcile(Some(&session())).await;

    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert!(store.snapshot().is_premium);
    assert_eq!(billing.checks(), 3);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_is_not_retried() {
    let billing = FakeBilling::new(Err(BillingError::TransportOrServer(
        "HTTP 503".to_string(),
    )));
    let (service, store) = service(&billing);

    let outcome = service.reconcile(Some(&session())).await;

    assert_eq!(outcome, ReconcileOutcome::Retained);
    assert_eq!(billing.checks(), 1);
    assert_eq!(store.snapshot(), free());
    let state = store.state();
    assert!(!state.is_reconciling);
    assert!(state.has_completed_initial_check);
}

#[tokio::test]
async fn test_missing_or_expired_session_signs_out() {
    let billing = FakeBilling::new(Ok(premium()));
    let (service, store) = service(&billing);

    assert_eq!(service.reconcile(Some(&session())).await, ReconcileOutcome::Applied);
    assert!(store.snapshot().is_premium);

    assert_eq!(service.reconcile(None).await, ReconcileOutcome::SignedOut);
    assert_eq!(store.snapshot(), free());

    assert_eq!(
        service.reconcile(Some(&expired_session())).await,
        ReconcileOutcome::SignedOut
    );
    // Signed-out paths never reach billing
    assert_eq!(billing.checks(), 1);
    assert!(store.state().has_completed_initial_check);
}

#[tokio::test]
async fn test_existing_premium_on_first_check_is_not_an_activation() {
    let billing = FakeBilling::new(Ok(premium()));
    let (service, store) = service(&billing);
    let session = session();

    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Applied);
    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Applied);
    assert!(store.snapshot().is_premium);
    assert!(!store.has_deferred_activation());
}

#[tokio::test]
async fn test_unchanged_premium_reconciled_twice_activates_once() {
    let billing = FakeBilling::new(Ok(premium()));
    billing.push(Ok(free()));
    let (service, store) = service(&billing);
    let session = session();

    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Applied);
    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Activated);
    assert_eq!(service.reconcile(Some(&session)).await, ReconcileOutcome::Withheld);

    // Premium stays withheld until the celebration confirms it
    assert!(!store.snapshot().is_premium);
    assert!(store.has_deferred_activation());
    assert!(store.confirm_deferred_activation());
    assert!(store.snapshot().is_premium);
}

#[tokio::test(start_paused = true)]
async fn test_older_result_settling_late_is_discarded() {
    let billing = FakeBilling::new(Ok(free()));
    billing.push_delayed(Duration::from_secs(5), Ok(free()));
    billing.push_delayed(Duration::from_secs(1), Ok(premium()));
    let (service, store) = service(&billing);
    let session = session();

    let (first, second) = join(
        service.reconcile(Some(&session)),
        service.reconcile(Some(&session)),
    )
    .await;

    assert_eq!(second, ReconcileOutcome::Applied);
    assert_eq!(first, ReconcileOutcome::Stale);
    assert!(store.snapshot().is_premium);
    assert!(!store.is_reconciling());
}

#[tokio::test(start_paused = true)]
async fn test_is_reconciling_while_call_is_outstanding() {
    let billing = FakeBilling::new(Ok(premium()));
    billing.push_delayed(Duration::from_secs(2), Ok(premium()));
    let (service, store) = service(&billing);
    let session = session();

    let observer = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.is_reconciling()
    };
    let (outcome, mid_flight) = join(service.reconcile(Some(&session)), observer).await;

    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert!(mid_flight);
    assert!(!store.is_reconciling());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_reconcile_clears_flag() {
    let billing = FakeBilling::new(Err(auth_missing()));
    let (service, store) = service(&billing);
    let session = session();

    let result =
        tokio::time::timeout(Duration::from_secs(3), service.reconcile(Some(&session))).await;

    assert!(result.is_err());
    let state = store.state();
    assert!(!state.is_reconciling);
    // A cancelled call never reached a verdict
    assert!(!state.has_completed_initial_check);
}
