use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use skylock_core::{HolderId, LockConfiguration};
use skylock_store::{AcquireOutcome, LeaseStore, ReleaseOutcome};
use tracing::{debug, error, info, warn};

use crate::{
    guard::LeaseGuard,
    types::{RunOutcome, RunState, SkipReason},
    work::Work,
};

/// Runs guarded work on behalf of one instance.
///
/// Holds no per-task state: two coordinators (or two processes) sharing a
/// store only ever coordinate through the lease rows.
pub struct LeaseCoordinator {
    store: Arc<dyn LeaseStore>,
    holder: HolderId,
}

impl LeaseCoordinator {
    pub fn new(store: Arc<dyn LeaseStore>, holder: HolderId) -> Self {
        Self { store, holder }
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Run `work` if, and only if, this instance wins `lock`'s lease.
    ///
    /// Never returns an error: contention and storage faults become
    /// `Skipped`, work errors and panics become `Failed`. In every case where
    /// the lease was acquired it is released (clamped to the min-hold floor)
    /// before returning.
    pub async fn run_guarded(&self, lock: &LockConfiguration, work: &dyn Work) -> RunOutcome {
        let state = step(lock, RunState::Idle, RunState::Acquiring);

        let lease = match self.store.try_acquire(lock, &self.holder).await {
            Ok(AcquireOutcome::Acquired(lease)) => lease,
            Ok(AcquireOutcome::NotAcquired) => {
                step(lock, state, RunState::Skipped);
                debug!(lock = %lock.name(), holder = %self.holder, "skipped: lease held elsewhere");
                return RunOutcome::Skipped {
                    reason: SkipReason::NotAcquired,
                };
            }
            Err(e) => {
                step(lock, state, RunState::Skipped);
                warn!(lock = %lock.name(), holder = %self.holder, error = %e, "skipped: lease store unavailable");
                return RunOutcome::Skipped {
                    reason: SkipReason::StorageUnavailable(e.to_string()),
                };
            }
        };

        let state = step(lock, state, RunState::Running);
        info!(lock = %lock.name(), holder = %self.holder, until = %lease.lock_until, "running guarded work");

        let guard = LeaseGuard::new(
            Arc::clone(&self.store),
            lock.clone(),
            self.holder.clone(),
            lease,
        );
        let started = Instant::now();
        // Building the future runs user code too, so it belongs inside the
        // unwind boundary.
        let result = match AssertUnwindSafe(async move { work.run(guard).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!("work panicked: {}", panic_message(&*panic))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let state = step(lock, state, RunState::Releasing);
        self.release(lock).await;
        step(lock, state, RunState::Idle);

        match result {
            Ok(()) => {
                info!(lock = %lock.name(), duration_ms = elapsed_ms, "guarded work finished");
                RunOutcome::Ran
            }
            Err(error) => {
                error!(lock = %lock.name(), duration_ms = elapsed_ms, "guarded work failed: {error:#}");
                RunOutcome::Failed { error }
            }
        }
    }

    /// Release failures are logged only; an unreleased lease still expires at
    /// its `lock_until`.
    async fn release(&self, lock: &LockConfiguration) {
        match self.store.release(lock, &self.holder).await {
            Ok(ReleaseOutcome::Released { lock_until }) => {
                debug!(lock = %lock.name(), until = %lock_until, "lease released");
            }
            Ok(ReleaseOutcome::NotOwner) => {
                warn!(lock = %lock.name(), holder = %self.holder, "lease expired and was reclaimed before release");
            }
            Err(e) => {
                warn!(lock = %lock.name(), error = %e, "lease release failed; it will expire on its own");
            }
        }
    }
}

fn step(lock: &LockConfiguration, from: RunState, to: RunState) -> RunState {
    debug_assert!(from.can_transition_to(to), "illegal run state change {from} -> {to}");
    debug!(lock = %lock.name(), %from, %to, "run state");
    to
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
