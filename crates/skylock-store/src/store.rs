use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skylock_core::{HolderId, Lease, LockConfiguration};

use crate::error::Result;
use crate::types::{AcquireOutcome, ExtendOutcome, ReleaseOutcome};

/// Atomic lease primitives over a shared table.
///
/// Implementations must evaluate every expiry comparison with the storage
/// engine's clock inside the same transaction as the write. An `Err` means the
/// store could not answer; callers must treat it as "not acquired" and never
/// run the guarded work unprotected.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Claim `lock.name()` for `holder` if it is absent or expired.
    ///
    /// On success `locked_at = now` and `lock_until = now + lock.max_hold()`.
    /// Racing callers for the same name: exactly one observes `Acquired`.
    async fn try_acquire(&self, lock: &LockConfiguration, holder: &HolderId)
        -> Result<AcquireOutcome>;

    /// Push `lock_until` to `now + max_hold` while `holder` still owns an
    /// unexpired lease.
    ///
    /// `max_hold` above [`MAX_HOLD_CEILING`] fails with
    /// [`StoreError::HoldOutOfRange`](crate::StoreError::HoldOutOfRange)
    /// without touching the row.
    ///
    /// [`MAX_HOLD_CEILING`]: skylock_core::types::MAX_HOLD_CEILING
    async fn extend(&self, name: &str, holder: &HolderId, max_hold: Duration)
        -> Result<ExtendOutcome>;

    /// Give the lease back early, but never before `locked_at + lock.min_hold()`.
    ///
    /// A non-owner call writes nothing and returns `NotOwner`.
    async fn release(&self, lock: &LockConfiguration, holder: &HolderId)
        -> Result<ReleaseOutcome>;

    /// True iff `holder` owns `name` and it has not expired.
    async fn is_held_by(&self, name: &str, holder: &HolderId) -> Result<bool>;

    async fn get(&self, name: &str) -> Result<Option<Lease>>;

    /// All rows ordered by name.
    async fn list(&self) -> Result<Vec<Lease>>;

    /// Current database-clock reading.
    async fn now(&self) -> Result<DateTime<Utc>>;
}
