use crate::support::{advance_ms, free, orchestrator, premium, session, settle, FakeBilling};
use entitlement_orchestrator::{
    models::celebration::CelebrationPhase,
    services::navigation::{InMemoryNavigator, Navigator},
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_checkout_return_celebrates_and_confirms() {
    let billing = FakeBilling::new(Ok(premium()));
    let (orchestrator, hub) = orchestrator(billing.clone());
    hub.set_session(Some(session()));
    let mut updates = orchestrator.celebration().subscribe();
    let navigator = InMemoryNavigator::new("/space?checkout=success");

    assert!(orchestrator.handle_checkout_return(&navigator));

    // Optimistic flip and cleaned location are visible immediately
    assert_eq!(navigator.current_location(), "/space");
    assert!(orchestrator.store().snapshot().is_premium);
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Idle);

    advance_ms(101).await;
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Breathe);
    // Background confirmation ran as soon as the session was there
    assert_eq!(billing.checks(), 1);
    assert!(orchestrator.store().state().has_completed_initial_check);

    advance_ms(14_000 - 101).await;
    settle().await;
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Ready);

    let mut affirmations = Vec::new();
    let mut run_ids = Vec::new();
    while let Ok(update) = updates.try_recv() {
        run_ids.push(update.run_id);
        if update.phase == CelebrationPhase::Affirmations {
            affirmations.push(update.affirmation_index);
        }
    }
    assert_eq!(affirmations, vec![0, 1, 2]);
    // Confirmation agreed with the optimistic state, so no second run
    run_ids.dedup();
    assert_eq!(run_ids.len(), 1);

    orchestrator.complete_celebration().unwrap();
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Idle);
    assert!(orchestrator.store().snapshot().is_premium);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_return_waits_for_session() {
    let billing = FakeBilling::new(Ok(premium()));
    let (orchestrator, hub) = orchestrator(billing.clone());
    let navigator = InMemoryNavigator::new("https://app.example.test/space?tab=2&checkout=success#top");

    assert!(orchestrator.handle_checkout_return(&navigator));
    assert_eq!(
        navigator.current_location(),
        "https://app.example.test/space?tab=2#top"
    );

    advance_ms(3_500).await;
    assert_eq!(billing.checks(), 0);
    assert!(orchestrator.store().snapshot().is_premium);

    hub.set_session(Some(session()));
    advance_ms(1_000).await;
    assert_eq!(billing.checks(), 1);
    assert!(orchestrator.store().snapshot().is_premium);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_confirmation_can_disagree() {
    let billing = FakeBilling::new(Ok(free()));
    let (orchestrator, hub) = orchestrator(billing.clone());
    hub.set_session(Some(session()));
    let navigator = InMemoryNavigator::new("/space?checkout=success");

    assert!(orchestrator.handle_checkout_return(&navigator));
    assert!(orchestrator.store().snapshot().is_premium);

    settle().await;
    assert_eq!(billing.checks(), 1);
    assert!(!orchestrator.store().snapshot().is_premium);

    // The run plays out; completing it does not resurrect premium
    advance_ms(14_000).await;
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Ready);
    orchestrator.complete_celebration().unwrap();
    assert!(!orchestrator.store().snapshot().is_premium);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_gives_up_without_session() {
    let billing = FakeBilling::new(Ok(premium()));
    let (orchestrator, _hub) = orchestrator(billing.clone());

    let started = tokio::time::Instant::now();
    assert_eq!(orchestrator.reconcile_when_session_ready().await, None);

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(billing.checks(), 0);
}

#[tokio::test]
async fn test_location_without_marker_is_left_alone() {
    let billing = FakeBilling::new(Ok(premium()));
    let (orchestrator, _hub) = orchestrator(billing.clone());

    for location in ["/space", "/space?checkout=cancelled", "/space?tab=checkout"] {
        let navigator = InMemoryNavigator::new(location);
        assert!(!orchestrator.handle_checkout_return(&navigator));
        assert_eq!(navigator.current_location(), location);
    }

    assert!(!orchestrator.store().snapshot().is_premium);
    assert_eq!(orchestrator.celebration().phase(), CelebrationPhase::Idle);
    assert_eq!(billing.checks(), 0);
}
