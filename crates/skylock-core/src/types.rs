use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SkylockError};

/// Longest hold a lease may request. Keeps `now + max_hold` inside the
/// 64-bit millisecond range the lease table stores.
pub const MAX_HOLD_CEILING: Duration = Duration::from_secs(u32::MAX as u64);

/// Longest schedule period, in seconds. Keeps the next tick representable as a
/// calendar instant.
pub const MAX_PERIOD_SECS: u64 = u32::MAX as u64;

/// Opaque identifier of the instance holding (or contesting) a lease.
///
/// Defaults to `hostname-pid`, which is what operators want to see when
/// inspecting the lease table. Falls back to a random UUID when the OS does
/// not report a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the current process.
    pub fn local() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().trim().to_string())
            .ok()
            .filter(|h| !h.is_empty());
        match host {
            Some(host) => Self(format!("{}-{}", host, std::process::id())),
            None => Self(Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HolderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name and timing of one guarded task.
///
/// `min_hold` is the anti-thrash floor ("lock at least for"): an early release
/// never makes the lease available before `locked_at + min_hold`.
/// `max_hold` is the crash-safety ceiling ("lock at most for"): the lease
/// expires on its own `max_hold` after acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfiguration {
    name: String,
    min_hold: Duration,
    max_hold: Duration,
}

impl LockConfiguration {
    pub fn new(name: impl Into<String>, min_hold: Duration, max_hold: Duration) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| SkylockError::InvalidLock {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("lock name must not be empty"));
        }
        if min_hold > max_hold {
            return Err(invalid(&format!(
                "min_hold ({}) is longer than max_hold ({})",
                humantime::format_duration(min_hold),
                humantime::format_duration(max_hold)
            )));
        }
        if max_hold > MAX_HOLD_CEILING {
            return Err(invalid("max_hold exceeds the supported range"));
        }

        Ok(Self {
            name,
            min_hold,
            max_hold,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_hold(&self) -> Duration {
        self.min_hold
    }

    pub fn max_hold(&self) -> Duration {
        self.max_hold
    }
}

impl fmt::Display for LockConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [min {}, max {}]",
            self.name,
            humantime::format_duration(self.min_hold),
            humantime::format_duration(self.max_hold)
        )
    }
}

/// A persisted lease row. Timestamps come from the database clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Task name, the primary key.
    pub name: String,
    /// Holder that last acquired the lease.
    pub locked_by: String,
    /// When the current holder acquired it.
    pub locked_at: DateTime<Utc>,
    /// The lease is held until this instant (exclusive).
    pub lock_until: DateTime<Utc>,
}

impl Lease {
    /// A lease is held iff `lock_until` is strictly after `now`.
    ///
    /// `now` must be a database-clock reading (see `LeaseStore::now`).
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }
}

/// Defines when a task's trigger fires on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fixed delay of N seconds between ticks, measured from the end of the previous tick.
    Interval { every_secs: u64 },

    /// Fire on wall-clock multiples of N seconds (60 = top of every minute).
    ///
    /// Every instance computes the same instants, so the fleet races for the
    /// lease on the same tick.
    Aligned { every_secs: u64 },

    /// Fire once a day at HH:MM UTC.
    Daily { hour: u8, minute: u8 },
}

impl Schedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Interval { every_secs: 0 } | Schedule::Aligned { every_secs: 0 } => Err(
                SkylockError::InvalidSchedule("period must be at least one second".to_string()),
            ),
            Schedule::Interval { every_secs } | Schedule::Aligned { every_secs }
                if *every_secs > MAX_PERIOD_SECS =>
            {
                Err(SkylockError::InvalidSchedule(format!(
                    "period of {every_secs}s exceeds the {MAX_PERIOD_SECS}s limit"
                )))
            }
            Schedule::Daily { hour, minute } if *hour > 23 || *minute > 59 => Err(
                SkylockError::InvalidSchedule(format!("{hour:02}:{minute:02} is not a valid time")),
            ),
            _ => Ok(()),
        }
    }
}
