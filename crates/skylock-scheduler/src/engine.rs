use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use skylock_core::{LockConfiguration, Schedule};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    coordinator::LeaseCoordinator,
    error::{Result, SchedulerError},
    schedule::delay_until_next,
    types::{RunOutcome, TickReport},
    work::Work,
};

/// A lock-guarded task and the trigger that fires it.
pub struct ScheduledTask {
    pub lock: LockConfiguration,
    pub schedule: Schedule,
    pub work: Arc<dyn Work>,
}

impl ScheduledTask {
    pub fn new(lock: LockConfiguration, schedule: Schedule, work: Arc<dyn Work>) -> Self {
        Self {
            lock,
            schedule,
            work,
        }
    }
}

/// Per-instance trigger loop: one tokio task per registered task, each firing
/// `run_guarded` on its schedule.
///
/// Instances share nothing in-process; running this engine on every node is
/// safe because the coordinator only runs work whose lease it wins.
pub struct SchedulerEngine {
    coordinator: Arc<LeaseCoordinator>,
    tasks: Vec<ScheduledTask>,
    /// If set, every tick's outcome is sent here.
    fired_tx: Option<mpsc::Sender<TickReport>>,
}

impl SchedulerEngine {
    /// Pass `Some(tx)` to receive a [`TickReport`] for every tick.
    /// The sender is non-blocking (`try_send`) so the tick loop is never stalled.
    pub fn new(
        coordinator: Arc<LeaseCoordinator>,
        fired_tx: Option<mpsc::Sender<TickReport>>,
    ) -> Self {
        Self {
            coordinator,
            tasks: Vec::new(),
            fired_tx,
        }
    }

    /// Add a task. Names must be unique: they are the lease keys.
    pub fn register(&mut self, task: ScheduledTask) -> Result<()> {
        task.schedule.validate()?;
        if self.tasks.iter().any(|t| t.lock.name() == task.lock.name()) {
            return Err(SchedulerError::DuplicateTask {
                name: task.lock.name().to_string(),
            });
        }
        info!(lock = %task.lock, schedule = ?task.schedule, "task registered");
        self.tasks.push(task);
        Ok(())
    }

    pub fn task_names(&self) -> HashSet<&str> {
        self.tasks.iter().map(|t| t.lock.name()).collect()
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true` (or its
    /// sender is dropped). Work already running when shutdown arrives is
    /// allowed to finish and release its lease.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            holder = %self.coordinator.holder(),
            tasks = self.tasks.len(),
            "scheduler engine started"
        );

        let mut loops = JoinSet::new();
        for task in self.tasks {
            loops.spawn(task_loop(
                Arc::clone(&self.coordinator),
                task,
                shutdown.clone(),
                self.fired_tx.clone(),
            ));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!("task loop aborted: {e}");
            }
        }
        info!("scheduler engine shutting down");
    }
}

async fn task_loop(
    coordinator: Arc<LeaseCoordinator>,
    task: ScheduledTask,
    mut shutdown: watch::Receiver<bool>,
    fired_tx: Option<mpsc::Sender<TickReport>>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = delay_until_next(&task.schedule, Utc::now());
        debug!(lock = %task.lock.name(), delay_ms = delay.as_millis() as u64, "next tick scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let fired_at = Utc::now();
        let outcome = coordinator
            .run_guarded(&task.lock, task.work.as_ref())
            .await;
        if let RunOutcome::Skipped { reason } = &outcome {
            debug!(lock = %task.lock.name(), ?reason, "tick skipped");
        }

        // Forward the tick to the observer (non-blocking).
        if let Some(ref tx) = fired_tx {
            if tx
                .try_send(TickReport::new(task.lock.name(), fired_at, &outcome))
                .is_err()
            {
                warn!(lock = %task.lock.name(), "tick report channel full or closed, report dropped");
            }
        }
    }
    debug!(lock = %task.lock.name(), "task loop stopped");
}
