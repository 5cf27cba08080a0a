use crate::{
    models::entitlement::{EntitlementSessionState, EntitlementSnapshot},
    services::activation::{self, ActivationSignal},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Issue-time stamp carried by every write to the store.
///
/// `epoch` pins the write to one session identity; `seq` orders writes by when
/// they were started, so a slow early write can never land over a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket {
    epoch: u64,
    seq: u64,
}

/// What happened to a settled reconciliation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Snapshot replaced the visible state
    Applied,
    /// Fresh activation: premium withheld until the celebration completes
    Activated,
    /// A celebration is already pending; the withheld snapshot was refreshed
    Withheld,
    /// Issued before the last applied write, or for a previous identity
    Stale,
}

struct StoreInner {
    state: EntitlementSessionState,
    identity: Option<Uuid>,
    epoch: u64,
    next_seq: u64,
    last_applied_seq: u64,
    in_flight: u32,
    deferred_activation: Option<EntitlementSnapshot>,
}

impl StoreInner {
    fn issue(&mut self) -> WriteTicket {
        let ticket = WriteTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        ticket
    }

    fn is_current(&self, ticket: WriteTicket) -> bool {
        ticket.epoch == self.epoch && ticket.seq > self.last_applied_seq
    }
}

/// Process-wide entitlement state for the current app session.
///
/// Cheap to clone; all clones share one state. Every mutation happens inside a
/// single critical section and is published to subscribers as one whole
/// [`EntitlementSessionState`] value, so readers never observe partial writes.
#[derive(Clone)]
pub struct EntitlementStore {
    inner: Arc<Mutex<StoreInner>>,
    tx: Arc<watch::Sender<EntitlementSessionState>>,
}

impl Default for EntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EntitlementSessionState::default());
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                state: EntitlementSessionState::default(),
                identity: None,
                epoch: 0,
                next_seq: 1,
                last_applied_seq: 0,
                in_flight: 0,
                deferred_activation: None,
            })),
            tx: Arc::new(tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &StoreInner) {
        self.tx.send_replace(inner.state.clone());
    }

    pub fn state(&self) -> EntitlementSessionState {
        self.lock().state.clone()
    }

    pub fn snapshot(&self) -> EntitlementSnapshot {
        self.lock().state.snapshot.clone()
    }

    pub fn is_reconciling(&self) -> bool {
        self.lock().state.is_reconciling
    }

    pub fn identity(&self) -> Option<Uuid> {
        self.lock().identity
    }

    pub fn has_deferred_activation(&self) -> bool {
        self.lock().deferred_activation.is_some()
    }

    /// Receive every published state change
    pub fn subscribe(&self) -> watch::Receiver<EntitlementSessionState> {
        self.tx.subscribe()
    }

    /// Start a reconciliation: marks the store as reconciling and stamps the call
    pub fn begin_reconcile(&self) -> WriteTicket {
        let mut inner = self.lock();
        let ticket = inner.issue();
        inner.in_flight += 1;
        inner.state.is_reconciling = true;
        self.publish(&inner);
        ticket
    }

    /// End a reconciliation started with [`begin_reconcile`](Self::begin_reconcile).
    ///
    /// `settled` is false when the call was cancelled before reaching a verdict;
    /// only settled calls complete the session's initial check.
    pub fn finish_reconcile(&self, ticket: WriteTicket, settled: bool) {
        let mut inner = self.lock();
        if ticket.epoch != inner.epoch {
            // reset_for_identity already zeroed the counter for the old session
            return;
        }
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.state.is_reconciling = inner.in_flight > 0;
        if settled {
            inner.state.has_completed_initial_check = true;
        }
        self.publish(&inner);
    }

    /// Merge a successful billing result.
    ///
    /// Activation is decided against the state as it is now, not as it was when
    /// the call was issued. A pending (withheld) activation counts as premium.
    pub fn settle(&self, ticket: WriteTicket, snapshot: EntitlementSnapshot) -> SettleOutcome {
        let mut inner = self.lock();
        if !inner.is_current(ticket) {
            debug!(
                ticket_seq = ticket.seq,
                last_applied = inner.last_applied_seq,
                "Discarding stale entitlement result"
            );
            return SettleOutcome::Stale;
        }
        inner.last_applied_seq = ticket.seq;

        let previous = inner
            .deferred_activation
            .clone()
            .unwrap_or_else(|| inner.state.snapshot.clone());

        match activation::detect(
            &previous,
            &snapshot,
            inner.state.has_completed_initial_check,
        ) {
            ActivationSignal::Activated => {
                inner.deferred_activation = Some(snapshot);
                SettleOutcome::Activated
            }
            ActivationSignal::NoChange => {
                if inner.deferred_activation.is_some() {
                    if snapshot.is_premium {
                        inner.deferred_activation = Some(snapshot);
                        return SettleOutcome::Withheld;
                    }
                    // Premium went away before the celebration finished
                    inner.deferred_activation = None;
                }
                inner.state.snapshot = snapshot;
                self.publish(&inner);
                SettleOutcome::Applied
            }
        }
    }

    /// No authenticated session: nothing can be premium.
    ///
    /// Before an identity is bound this is a definitive first check. Once one is
    /// bound (the token lapsed) the session starts over as after a logout: writes
    /// in flight go stale and the next valid check is a first check again.
    pub fn apply_signed_out(&self) {
        let mut inner = self.lock();
        if inner.identity.is_some() {
            inner.epoch += 1;
            inner.in_flight = 0;
            inner.deferred_activation = None;
            inner.state = EntitlementSessionState::default();
            self.publish(&inner);
            return;
        }

        let ticket = inner.issue();
        inner.last_applied_seq = ticket.seq;
        inner.deferred_activation = None;
        inner.state.snapshot = EntitlementSnapshot::signed_out();
        inner.state.has_completed_initial_check = true;
        self.publish(&inner);
    }

    /// Checkout fast path: show premium now, confirm in the background.
    ///
    /// Takes its own ticket, so reconciliations issued before this call cannot
    /// undo it when they settle late.
    pub fn apply_optimistic_premium(&self) {
        let mut inner = self.lock();
        let ticket = inner.issue();
        inner.last_applied_seq = ticket.seq;
        let mut snapshot = inner
            .deferred_activation
            .take()
            .unwrap_or_else(|| inner.state.snapshot.clone());
        snapshot.is_premium = true;
        inner.state.snapshot = snapshot;
        self.publish(&inner);
    }

    /// Make a withheld activation visible. Returns false when none was pending.
    pub fn confirm_deferred_activation(&self) -> bool {
        let mut inner = self.lock();
        match inner.deferred_activation.take() {
            Some(snapshot) => {
                inner.state.snapshot = snapshot;
                self.publish(&inner);
                true
            }
            None => false,
        }
    }

    pub fn discard_deferred_activation(&self) {
        self.lock().deferred_activation = None;
    }

    /// Attach the first identity of the app session without resetting state.
    ///
    /// Anything written before the session hydrated (e.g. an optimistic
    /// checkout flip) stays in place. No-op when an identity is already bound.
    pub fn bind_identity(&self, identity: Uuid) {
        let mut inner = self.lock();
        if inner.identity.is_none() {
            inner.identity = Some(identity);
        }
    }

    /// Start a fresh session state for `identity` (None on logout).
    ///
    /// Writes issued for the previous identity become stale.
    pub fn reset_for_identity(&self, identity: Option<Uuid>) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.identity = identity;
        inner.in_flight = 0;
        inner.deferred_activation = None;
        inner.state = EntitlementSessionState::default();
        self.publish(&inner);
    }
}
