use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use skylock_core::config::DatabaseConfig;
use skylock_core::types::MAX_HOLD_CEILING;
use skylock_core::{HolderId, Lease, LockConfiguration};
use tracing::{debug, info};

use crate::{
    clock::{duration_ms, DbClock},
    db::{init_db, validate_table_name},
    error::{Result, StoreError},
    store::LeaseStore,
    types::{AcquireOutcome, ExtendOutcome, ReleaseOutcome},
};

/// How a [`SqliteLeaseStore`] talks to its database.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub table: String,
    /// Upper bound on waiting for a competing writer's transaction.
    pub busy_timeout: Duration,
    pub clock: DbClock,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table: skylock_core::config::DEFAULT_TABLE.to_string(),
            busy_timeout: Duration::from_millis(skylock_core::config::DEFAULT_BUSY_TIMEOUT_MS),
            clock: DbClock::Engine,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            table: config.table.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            clock: DbClock::Engine,
        }
    }

    pub fn with_clock(mut self, clock: DbClock) -> Self {
        self.clock = clock;
        self
    }
}

/// SQL text for one table + clock combination, built once per store.
#[derive(Debug)]
struct Statements {
    acquire: String,
    extend: String,
    release: String,
    held: String,
    get: String,
    list: String,
    now: String,
}

impl Statements {
    fn new(table: &str, now: &str) -> Self {
        Self {
            // Insert, or take over a row whose lease has run out. The DO UPDATE
            // guard makes this a single conditional write: a live lease leaves
            // the row untouched and RETURNING yields nothing.
            acquire: format!(
                "INSERT INTO {table} (name, lock_until, locked_at, locked_by)
                 VALUES (?1, {now} + ?2, {now}, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                     lock_until = excluded.lock_until,
                     locked_at  = excluded.locked_at,
                     locked_by  = excluded.locked_by
                 WHERE {table}.lock_until <= excluded.locked_at
                 RETURNING name, lock_until, locked_at, locked_by"
            ),
            extend: format!(
                "UPDATE {table} SET lock_until = {now} + ?3
                 WHERE name = ?1 AND locked_by = ?2 AND lock_until > {now}
                 RETURNING lock_until"
            ),
            // Never earlier than the min-hold floor, never later than the
            // lease already allows.
            release: format!(
                "UPDATE {table} SET lock_until = MIN(lock_until, MAX(locked_at + ?3, {now}))
                 WHERE name = ?1 AND locked_by = ?2
                 RETURNING lock_until"
            ),
            held: format!(
                "SELECT EXISTS(SELECT 1 FROM {table}
                 WHERE name = ?1 AND locked_by = ?2 AND lock_until > {now})"
            ),
            get: format!(
                "SELECT name, lock_until, locked_at, locked_by FROM {table} WHERE name = ?1"
            ),
            list: format!(
                "SELECT name, lock_until, locked_at, locked_by FROM {table} ORDER BY name"
            ),
            now: format!("SELECT {now}"),
        }
    }
}

/// [`LeaseStore`] backed by a SQLite file shared by every instance.
///
/// One connection per store, guarded by a `Mutex` and driven from
/// `spawn_blocking` so async callers never block a runtime worker on a busy
/// database. Each instance in a fleet opens its own store.
#[derive(Clone)]
pub struct SqliteLeaseStore {
    conn: Arc<Mutex<Connection>>,
    sql: Arc<Statements>,
    table: String,
}

impl std::fmt::Debug for SqliteLeaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLeaseStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SqliteLeaseStore {
    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn, options)
    }

    /// Wrap an already-open connection, initialising the lease table.
    pub fn new(conn: Connection, options: StoreOptions) -> Result<Self> {
        validate_table_name(&options.table)?;
        conn.busy_timeout(options.busy_timeout)?;
        options.clock.install(&conn)?;
        init_db(&conn, &options.table)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sql: Arc::new(Statements::new(&options.table, options.clock.now_sql())),
            table: options.table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run `op` against the connection on the blocking pool.
    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &Statements) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let sql = Arc::clone(&self.sql);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))?;
            op(&mut conn, &sql)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store worker failed: {e}")))?
    }
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn try_acquire(
        &self,
        lock: &LockConfiguration,
        holder: &HolderId,
    ) -> Result<AcquireOutcome> {
        let name = lock.name().to_string();
        let holder_id = holder.to_string();
        let max_ms = duration_ms(lock.max_hold());

        let acquired = self
            .call(move |conn, sql| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let lease = tx
                    .query_row(&sql.acquire, params![name, max_ms, holder_id], row_to_lease)
                    .optional()?;
                tx.commit()?;
                Ok(lease)
            })
            .await?;

        match acquired {
            Some(lease) => {
                info!(lock = %lease.name, holder = %lease.locked_by, until = %lease.lock_until, "lease acquired");
                Ok(AcquireOutcome::Acquired(lease))
            }
            None => {
                debug!(lock = %lock.name(), %holder, "lease held elsewhere");
                Ok(AcquireOutcome::NotAcquired)
            }
        }
    }

    async fn extend(
        &self,
        name: &str,
        holder: &HolderId,
        max_hold: Duration,
    ) -> Result<ExtendOutcome> {
        if max_hold > MAX_HOLD_CEILING {
            return Err(StoreError::HoldOutOfRange {
                secs: max_hold.as_secs(),
            });
        }
        let name_owned = name.to_string();
        let holder_id = holder.to_string();
        let max_ms = duration_ms(max_hold);

        let extended = self
            .call(move |conn, sql| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let until = tx
                    .query_row(&sql.extend, params![name_owned, holder_id, max_ms], |r| {
                        ms_to_dt(r, 0)
                    })
                    .optional()?;
                tx.commit()?;
                Ok(until)
            })
            .await?;

        match extended {
            Some(lock_until) => {
                debug!(lock = %name, %holder, until = %lock_until, "lease extended");
                Ok(ExtendOutcome::Extended { lock_until })
            }
            None => {
                info!(lock = %name, %holder, "lease lost before extension");
                Ok(ExtendOutcome::LostOwnership)
            }
        }
    }

    async fn release(
        &self,
        lock: &LockConfiguration,
        holder: &HolderId,
    ) -> Result<ReleaseOutcome> {
        let name = lock.name().to_string();
        let holder_id = holder.to_string();
        let min_ms = duration_ms(lock.min_hold());

        let released = self
            .call(move |conn, sql| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let until = tx
                    .query_row(&sql.release, params![name, holder_id, min_ms], |r| {
                        ms_to_dt(r, 0)
                    })
                    .optional()?;
                tx.commit()?;
                Ok(until)
            })
            .await?;

        Ok(match released {
            Some(lock_until) => {
                debug!(lock = %lock.name(), %holder, until = %lock_until, "lease released");
                ReleaseOutcome::Released { lock_until }
            }
            None => ReleaseOutcome::NotOwner,
        })
    }

    async fn is_held_by(&self, name: &str, holder: &HolderId) -> Result<bool> {
        let name = name.to_string();
        let holder_id = holder.to_string();
        self.call(move |conn, sql| {
            Ok(conn.query_row(&sql.held, params![name, holder_id], |r| r.get(0))?)
        })
        .await
    }

    async fn get(&self, name: &str) -> Result<Option<Lease>> {
        let name = name.to_string();
        self.call(move |conn, sql| {
            Ok(conn
                .query_row(&sql.get, params![name], row_to_lease)
                .optional()?)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Lease>> {
        self.call(|conn, sql| {
            let mut stmt = conn.prepare(&sql.list)?;
            let leases = stmt
                .query_map([], row_to_lease)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(leases)
        })
        .await
    }

    async fn now(&self) -> Result<DateTime<Utc>> {
        self.call(|conn, sql| Ok(conn.query_row(&sql.now, [], |r| ms_to_dt(r, 0))?))
            .await
    }
}

// Columns: name, lock_until, locked_at, locked_by
fn row_to_lease(row: &Row<'_>) -> rusqlite::Result<Lease> {
    Ok(Lease {
        name: row.get(0)?,
        lock_until: ms_to_dt(row, 1)?,
        locked_at: ms_to_dt(row, 2)?,
        locked_by: row.get(3)?,
    })
}

fn ms_to_dt(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn store_at(clock: &ManualClock) -> SqliteLeaseStore {
        let options = StoreOptions::default().with_clock(DbClock::Manual(clock.clone()));
        SqliteLeaseStore::new(Connection::open_in_memory().unwrap(), options).unwrap()
    }

    fn lock(min: u64, max: u64) -> LockConfiguration {
        LockConfiguration::new("job", Duration::from_secs(min), Duration::from_secs(max)).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn acquire_writes_database_timestamps() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);

        let outcome = store.try_acquire(&lock(0, 50), &"node-a".into()).await.unwrap();
        let lease = match outcome {
            AcquireOutcome::Acquired(lease) => lease,
            other => panic!("expected Acquired, got {other:?}"),
        };
        assert_eq!(lease.locked_by, "node-a");
        assert_eq!(lease.locked_at, start());
        assert_eq!(lease.lock_until, start() + chrono::Duration::seconds(50));
        assert_eq!(store.get("job").await.unwrap(), Some(lease));
    }

    #[tokio::test]
    async fn live_lease_blocks_even_its_own_holder() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let a = HolderId::from("node-a");

        assert!(store.try_acquire(&lock(0, 50), &a).await.unwrap().is_acquired());
        clock.advance(Duration::from_secs(10));
        assert_eq!(
            store.try_acquire(&lock(0, 50), &a).await.unwrap(),
            AcquireOutcome::NotAcquired
        );
    }

    #[tokio::test]
    async fn release_after_min_hold_frees_immediately() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let a = HolderId::from("node-a");
        let cfg = lock(5, 50);

        store.try_acquire(&cfg, &a).await.unwrap();
        clock.advance(Duration::from_secs(20));
        let released = store.release(&cfg, &a).await.unwrap();
        assert_eq!(
            released,
            ReleaseOutcome::Released {
                lock_until: start() + chrono::Duration::seconds(20)
            }
        );
        assert!(store.try_acquire(&cfg, &"node-b".into()).await.unwrap().is_acquired());
    }

    #[tokio::test]
    async fn release_never_lengthens_an_expired_lease() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let a = HolderId::from("node-a");
        let cfg = lock(1, 2);

        store.try_acquire(&cfg, &a).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let released = store.release(&cfg, &a).await.unwrap();
        assert_eq!(
            released,
            ReleaseOutcome::Released {
                lock_until: start() + chrono::Duration::seconds(2)
            }
        );
    }

    #[tokio::test]
    async fn extend_moves_lock_until_from_database_now() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let a = HolderId::from("node-a");

        store.try_acquire(&lock(0, 10), &a).await.unwrap();
        clock.advance(Duration::from_secs(8));
        let extended = store.extend("job", &a, Duration::from_secs(10)).await.unwrap();
        assert_eq!(
            extended,
            ExtendOutcome::Extended {
                lock_until: start() + chrono::Duration::seconds(18)
            }
        );
        clock.advance(Duration::from_secs(5));
        assert!(store.is_held_by("job", &a).await.unwrap());
    }

    #[tokio::test]
    async fn extend_beyond_ceiling_is_rejected_before_sql() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let a = HolderId::from("node-a");
        store.try_acquire(&lock(0, 10), &a).await.unwrap();

        let err = store
            .extend("job", &a, Duration::from_secs(u64::MAX / 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::HoldOutOfRange { .. }), "{err:?}");

        let lease = store.get("job").await.unwrap().unwrap();
        assert_eq!(lease.lock_until, start() + chrono::Duration::seconds(10));
        assert!(matches!(
            store.extend("job", &a, MAX_HOLD_CEILING).await.unwrap(),
            ExtendOutcome::Extended { .. }
        ));
    }

    #[tokio::test]
    async fn extend_of_unknown_lease_is_lost() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        assert_eq!(
            store.extend("nope", &"a".into(), Duration::from_secs(1)).await.unwrap(),
            ExtendOutcome::LostOwnership
        );
    }

    #[tokio::test]
    async fn list_and_now_read_the_table() {
        let clock = ManualClock::starting_at(start());
        let store = store_at(&clock);
        let b = LockConfiguration::new("b-job", Duration::ZERO, Duration::from_secs(1)).unwrap();
        store.try_acquire(&b, &"x".into()).await.unwrap();
        store.try_acquire(&lock(0, 1), &"y".into()).await.unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, ["b-job", "job"]);
        assert_eq!(store.now().await.unwrap(), start());
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let options = StoreOptions {
            table: "locks;--".to_string(),
            ..StoreOptions::default()
        };
        let err = SqliteLeaseStore::new(Connection::open_in_memory().unwrap(), options).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTable(_)));
    }
}
