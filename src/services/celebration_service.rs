use crate::{
    error::{ApiError, Result},
    models::celebration::{CelebrationPhase, CelebrationUpdate},
    services::entitlement_store::EntitlementStore,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info};

/// A single scheduled transition of a celebration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelebrationStep {
    Enter(CelebrationPhase),
    /// Advance the affirmation cursor while in `Affirmations`
    Affirmation(u8),
}

/// Transition times, all measured from the moment of `trigger()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelebrationSchedule {
    steps: Vec<(Duration, CelebrationStep)>,
}

impl Default for CelebrationSchedule {
    fn default() -> Self {
        use CelebrationPhase::*;
        use CelebrationStep::{Affirmation, Enter};

        let ms = Duration::from_millis;
        Self {
            steps: vec![
                (ms(100), Enter(Breathe)),
                (ms(1_500), Enter(Ascend)),
                (ms(3_000), Enter(Acknowledgment)),
                (ms(6_000), Enter(Affirmations)),
                (ms(8_000), Affirmation(1)),
                (ms(10_000), Affirmation(2)),
                (ms(12_000), Enter(Sanctuary)),
                (ms(14_000), Enter(Ready)),
            ],
        }
    }
}

impl CelebrationSchedule {
    pub fn steps(&self) -> &[(Duration, CelebrationStep)] {
        &self.steps
    }

    /// Offset at which the run reaches `Ready`
    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|(at, _)| *at)
            .max()
            .unwrap_or_default()
    }
}

struct RunState {
    run_id: u64,
    phase: CelebrationPhase,
    affirmation_index: u8,
    timers: Vec<JoinHandle<()>>,
}

impl RunState {
    fn update(&self) -> CelebrationUpdate {
        CelebrationUpdate {
            run_id: self.run_id,
            phase: self.phase,
            affirmation_index: self.affirmation_index,
        }
    }

    /// Cancel every pending transition and start a new (idle) run id.
    ///
    /// Bumping the run id turns any timer that already fired but has not yet
    /// taken the lock into a no-op.
    fn clear(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.run_id += 1;
        self.phase = CelebrationPhase::Idle;
        self.affirmation_index = 0;
    }

    fn apply(&mut self, step: CelebrationStep) -> bool {
        match step {
            CelebrationStep::Enter(phase) if phase > self.phase => {
                self.phase = phase;
                true
            }
            CelebrationStep::Affirmation(index)
                if self.phase == CelebrationPhase::Affirmations
                    && index > self.affirmation_index =>
            {
                self.affirmation_index = index;
                true
            }
            _ => false,
        }
    }
}

/// Timer-driven onboarding celebration.
///
/// At most one run is active. Every transition of a run is scheduled up front
/// and recorded so that a reset or a superseding trigger cancels all of them.
pub struct CelebrationService {
    state: Arc<Mutex<RunState>>,
    schedule: Arc<CelebrationSchedule>,
    store: EntitlementStore,
    updates: broadcast::Sender<CelebrationUpdate>,
}

impl CelebrationService {
    pub fn new(store: EntitlementStore) -> Self {
        Self::with_schedule(store, CelebrationSchedule::default())
    }

    fn with_schedule(store: EntitlementStore, schedule: CelebrationSchedule) -> Self {
        let (updates, _rx) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(RunState {
                run_id: 0,
                phase: CelebrationPhase::Idle,
                affirmation_index: 0,
                timers: Vec::new(),
            })),
            schedule: Arc::new(schedule),
            store,
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        lock_run(&self.state)
    }

    pub fn current(&self) -> CelebrationUpdate {
        self.lock().update()
    }

    pub fn phase(&self) -> CelebrationPhase {
        self.lock().phase
    }

    pub fn affirmation_index(&self) -> u8 {
        self.lock().affirmation_index
    }

    /// Number of transitions of the current run that have not fired yet
    pub fn pending_timers(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|timer| !timer.is_finished())
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CelebrationUpdate> {
        self.updates.subscribe()
    }

    /// Start a run from the beginning, superseding any run in progress.
    ///
    /// Must be called from within a tokio runtime. Returns the new run id.
    pub fn trigger(&self) -> u64 {
        let started_at = Instant::now();
        let mut run = self.lock();
        let superseded = run.phase.is_running();
        run.clear();
        let run_id = run.run_id;

        for &(offset, step) in self.schedule.steps() {
            let state = Arc::clone(&self.state);
            let updates = self.updates.clone();
            run.timers.push(tokio::spawn(async move {
                tokio::time::sleep_until(started_at + offset).await;
                fire(&state, &updates, run_id, step);
            }));
        }

        info!(
            run_id = run_id,
            superseded = superseded,
            ready_in_ms = self.schedule.total_duration().as_millis() as u64,
            "Celebration triggered"
        );
        let _ = self.updates.send(run.update());
        run_id
    }

    /// Finish the celebration from `Ready` and reveal the withheld premium state
    pub fn complete(&self) -> Result<()> {
        let mut run = self.lock();
        if run.phase != CelebrationPhase::Ready {
            return Err(ApiError::Conflict(format!(
                "Celebration cannot complete from phase '{}'",
                run.phase
            )));
        }

        let finished_run = run.run_id;
        run.clear();
        let confirmed = self.store.confirm_deferred_activation();

        info!(
            run_id = finished_run,
            deferred_confirmed = confirmed,
            "Celebration completed"
        );
        let _ = self.updates.send(run.update());
        Ok(())
    }

    /// Stop any run and return to `Idle` without completing it
    pub fn reset(&self) {
        let mut run = self.lock();
        if !run.phase.is_running() && run.timers.is_empty() {
            return;
        }
        let cancelled_run = run.run_id;
        run.clear();
        debug!(run_id = cancelled_run, "Celebration reset");
        let _ = self.updates.send(run.update());
    }

    /// Session ended mid-run: reset and drop the withheld activation
    pub fn cancel(&self) {
        self.reset();
        self.store.discard_deferred_activation();
    }
}

impl Drop for CelebrationService {
    fn drop(&mut self) {
        for timer in self.lock().timers.drain(..) {
            timer.abort();
        }
    }
}

fn lock_run(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timer callback: apply `step` unless its run has been superseded
fn fire(
    state: &Mutex<RunState>,
    updates: &broadcast::Sender<CelebrationUpdate>,
    run_id: u64,
    step: CelebrationStep,
) {
    let mut run = lock_run(state);
    if run.run_id != run_id {
        return;
    }
    if run.apply(step) {
        debug!(
            run_id = run_id,
            phase = %run.phase,
            affirmation_index = run.affirmation_index,
            "Celebration advanced"
        );
        let _ = updates.send(run.update());
    }
}
