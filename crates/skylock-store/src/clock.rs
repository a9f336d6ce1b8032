use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::error::Result;

/// Name of the SQL function registered for [`DbClock::Manual`].
pub const MANUAL_NOW_FN: &str = "skylock_now_ms";

/// SQLite's own clock as epoch milliseconds. `'now'` is fixed for the duration
/// of one statement, so every reference inside a statement sees the same value.
const ENGINE_NOW_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

/// Where the lease table reads "now" from.
///
/// Either way the value is produced by SQLite while it evaluates the
/// conditional write; callers never pass a timestamp in.
#[derive(Debug, Clone, Default)]
pub enum DbClock {
    /// The storage engine's wall clock.
    #[default]
    Engine,
    /// A shared, manually advanced clock exposed to SQL as a function.
    ///
    /// Every connection registered with the same [`ManualClock`] sees the same
    /// time, which lets a simulated fleet step through lease windows
    /// deterministically.
    Manual(ManualClock),
}

impl DbClock {
    /// SQL expression yielding the current epoch-ms value.
    pub(crate) fn now_sql(&self) -> &'static str {
        match self {
            DbClock::Engine => ENGINE_NOW_SQL,
            DbClock::Manual(_) => "skylock_now_ms()",
        }
    }

    /// Register whatever the SQL expression needs on `conn`.
    pub(crate) fn install(&self, conn: &Connection) -> Result<()> {
        if let DbClock::Manual(clock) = self {
            let clock = clock.clone();
            conn.create_scalar_function(MANUAL_NOW_FN, 0, FunctionFlags::SQLITE_UTF8, move |_| {
                Ok(clock.now_ms())
            })?;
        }
        Ok(())
    }
}

/// Millisecond clock shared between connections.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(at.timestamp_millis())),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

/// Duration as SQL-friendly milliseconds, saturating at `i64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
