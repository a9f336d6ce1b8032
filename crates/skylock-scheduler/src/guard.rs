use std::sync::Arc;
use std::time::Duration;

use skylock_core::types::MAX_HOLD_CEILING;
use skylock_core::{HolderId, Lease, LockConfiguration};
use skylock_store::{ExtendOutcome, LeaseStore};

use crate::error::GuardError;

/// Handle passed to guarded work while this instance holds the lease.
///
/// Cheap to clone. Dropping it does not release anything; the coordinator
/// releases once the work returns.
#[derive(Clone)]
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    lock: LockConfiguration,
    holder: HolderId,
    lease: Lease,
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("lock", &self.lock)
            .field("holder", &self.holder)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl LeaseGuard {
    pub(crate) fn new(
        store: Arc<dyn LeaseStore>,
        lock: LockConfiguration,
        holder: HolderId,
        lease: Lease,
    ) -> Self {
        Self {
            store,
            lock,
            holder,
            lease,
        }
    }

    pub fn lock(&self) -> &LockConfiguration {
        &self.lock
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    /// The row as written at acquisition time.
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Keep the lease for another `max_hold`, counted from the database's now.
    pub async fn extend(&self, max_hold: Duration) -> Result<ExtendOutcome, GuardError> {
        if max_hold > MAX_HOLD_CEILING {
            return Err(GuardError::HoldOutOfRange {
                secs: max_hold.as_secs(),
            });
        }
        Ok(self
            .store
            .extend(self.lock.name(), &self.holder, max_hold)
            .await?)
    }

    /// Fail unless this instance still owns an unexpired lease.
    pub async fn assert_locked(&self) -> Result<(), GuardError> {
        if self
            .store
            .is_held_by(self.lock.name(), &self.holder)
            .await?
        {
            Ok(())
        } else {
            Err(GuardError::NotLocked {
                name: self.lock.name().to_string(),
                holder: self.holder.to_string(),
            })
        }
    }
}
