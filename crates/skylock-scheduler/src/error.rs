use skylock_core::SkylockError;
use skylock_store::StoreError;
use thiserror::Error;

/// Errors from registering or configuring scheduled tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Two tasks would contend for the same lease row on one instance.
    #[error("Task already registered: {name}")]
    DuplicateTask { name: String },

    /// The task's lock timing or schedule is invalid.
    #[error(transparent)]
    InvalidTask(#[from] SkylockError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors surfaced to guarded work through [`LeaseGuard`](crate::LeaseGuard).
#[derive(Debug, Error)]
pub enum GuardError {
    /// This instance no longer owns an unexpired lease for the task.
    #[error("Lease '{name}' is not held by {holder}")]
    NotLocked { name: String, holder: String },

    /// The requested hold does not fit the lease table's time range.
    #[error("Hold of {secs}s is out of range")]
    HoldOutOfRange { secs: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
