use chrono::{DateTime, Utc};
use skylock_core::Lease;

/// Result of [`LeaseStore::try_acquire`](crate::LeaseStore::try_acquire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This holder now owns the lease; the row as written.
    Acquired(Lease),
    /// Another holder owns an unexpired lease. Expected contention, not an error.
    NotAcquired,
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired(_))
    }
}

/// Result of [`LeaseStore::extend`](crate::LeaseStore::extend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended { lock_until: DateTime<Utc> },
    /// The lease expired or now belongs to someone else. Abort the work.
    LostOwnership,
}

/// Result of [`LeaseStore::release`](crate::LeaseStore::release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// `lock_until` is the effective unlock time after the min-hold clamp.
    Released { lock_until: DateTime<Utc> },
    /// The row is held by another holder (or absent); nothing was written.
    NotOwner,
}
