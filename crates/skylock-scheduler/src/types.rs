use chrono::{DateTime, Utc};

/// Where one `run_guarded` invocation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Acquiring,
    /// Lease not won; terminal for this invocation.
    Skipped,
    /// Work executing under the lease.
    Running,
    Releasing,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Skipped)
                | (Acquiring, Running)
                | (Running, Releasing)
                | (Releasing, Idle)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Acquiring => "acquiring",
            RunState::Skipped => "skipped",
            RunState::Running => "running",
            RunState::Releasing => "releasing",
        };
        write!(f, "{s}")
    }
}

/// Why a tick did not run the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another instance holds the lease. Normal steady state.
    NotAcquired,
    /// The store could not answer; treated like `NotAcquired`.
    StorageUnavailable(String),
}

/// Result of one guarded invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// The work ran to completion under the lease.
    Ran,
    Skipped { reason: SkipReason },
    /// The work itself failed (or panicked). The lease was still released.
    Failed { error: anyhow::Error },
}

impl RunOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RunOutcome::Ran => OutcomeKind::Ran,
            RunOutcome::Skipped { .. } => OutcomeKind::Skipped,
            RunOutcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    pub fn is_ran(&self) -> bool {
        matches!(self, RunOutcome::Ran)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Ran,
    Skipped,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutcomeKind::Ran => "ran",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Summary of one engine tick, forwarded to an optional observer channel.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub task: String,
    /// Local wall-clock time the tick fired (informational only).
    pub fired_at: DateTime<Utc>,
    pub outcome: OutcomeKind,
    /// Skip reason or error text, if any.
    pub detail: Option<String>,
}

impl TickReport {
    pub fn new(task: &str, fired_at: DateTime<Utc>, outcome: &RunOutcome) -> Self {
        let detail = match outcome {
            RunOutcome::Ran => None,
            RunOutcome::Skipped {
                reason: SkipReason::NotAcquired,
            } => None,
            RunOutcome::Skipped {
                reason: SkipReason::StorageUnavailable(e),
            } => Some(e.clone()),
            RunOutcome::Failed { error } => Some(format!("{error:#}")),
        };
        Self {
            task: task.to_string(),
            fired_at,
            outcome: outcome.kind(),
            detail,
        }
    }
}
