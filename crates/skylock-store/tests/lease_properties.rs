// Lease semantics shared by every instance in a fleet: each "instance" here
// opens its own connection to one database file.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use skylock_core::{HolderId, LockConfiguration};
use skylock_store::{
    AcquireOutcome, DbClock, ExtendOutcome, LeaseStore, ManualClock, ReleaseOutcome,
    SqliteLeaseStore, StoreOptions,
};
use tokio::sync::Barrier;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn lock(name: &str, min: u64, max: u64) -> LockConfiguration {
    LockConfiguration::new(name, secs(min), secs(max)).unwrap()
}

/// One shared database file plus a manual database clock.
struct Fleet {
    _dir: tempfile::TempDir,
    path: std::path::PathBuf,
    clock: ManualClock,
}

impl Fleet {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("leases.db");
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        Self {
            _dir: dir,
            path,
            clock,
        }
    }

    fn instance(&self) -> SqliteLeaseStore {
        let options = StoreOptions::default().with_clock(DbClock::Manual(self.clock.clone()));
        SqliteLeaseStore::open(&self.path, options).expect("open store")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquire_has_exactly_one_winner() {
    const N: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");

    // real engine clock: nothing is simulated in this race
    let stores: Vec<_> = (0..N)
        .map(|_| SqliteLeaseStore::open(&path, StoreOptions::default()).unwrap())
        .collect();
    let barrier = Arc::new(Barrier::new(N));
    let cfg = lock("race", 30, 50);

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(i, store)| {
            let barrier = Arc::clone(&barrier);
            let cfg = cfg.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                store
                    .try_acquire(&cfg, &HolderId::new(format!("node-{i}")))
                    .await
            })
        })
        .collect();

    let mut acquired = 0;
    for outcome in futures_util::future::join_all(handles).await {
        match outcome.unwrap().expect("store error under contention") {
            AcquireOutcome::Acquired(_) => acquired += 1,
            AcquireOutcome::NotAcquired => {}
        }
    }
    assert_eq!(acquired, 1);
}

#[tokio::test]
async fn release_is_clamped_to_min_hold() {
    let fleet = Fleet::new();
    let (a, b) = (fleet.instance(), fleet.instance());
    let cfg = lock("job", 30, 50);

    assert!(a.try_acquire(&cfg, &"a".into()).await.unwrap().is_acquired());

    fleet.clock.advance(secs(1));
    assert!(matches!(
        a.release(&cfg, &"a".into()).await.unwrap(),
        ReleaseOutcome::Released { .. }
    ));

    fleet.clock.advance(secs(9)); // t = 10s
    assert_eq!(
        b.try_acquire(&cfg, &"b".into()).await.unwrap(),
        AcquireOutcome::NotAcquired
    );

    fleet.clock.advance(secs(21)); // t = 31s
    assert!(b.try_acquire(&cfg, &"b".into()).await.unwrap().is_acquired());
}

#[tokio::test]
async fn expired_lease_self_heals() {
    let fleet = Fleet::new();
    let (a, b) = (fleet.instance(), fleet.instance());
    let cfg = lock("job", 0, 5);

    assert!(a.try_acquire(&cfg, &"a".into()).await.unwrap().is_acquired());

    fleet.clock.advance(secs(4));
    assert_eq!(
        b.try_acquire(&cfg, &"b".into()).await.unwrap(),
        AcquireOutcome::NotAcquired
    );

    fleet.clock.advance(secs(2)); // t = 6s
    let lease = match b.try_acquire(&cfg, &"b".into()).await.unwrap() {
        AcquireOutcome::Acquired(lease) => lease,
        other => panic!("expected Acquired, got {other:?}"),
    };
    assert_eq!(lease.locked_by, "b");
}

#[tokio::test]
async fn extend_fails_after_takeover() {
    let fleet = Fleet::new();
    let (a, b) = (fleet.instance(), fleet.instance());
    let cfg = lock("job", 0, 1);

    assert!(a.try_acquire(&cfg, &"a".into()).await.unwrap().is_acquired());
    fleet.clock.advance(secs(2));
    assert!(b.try_acquire(&cfg, &"b".into()).await.unwrap().is_acquired());

    assert_eq!(
        a.extend("job", &"a".into(), secs(10)).await.unwrap(),
        ExtendOutcome::LostOwnership
    );
    // b's lease is untouched
    assert!(b.is_held_by("job", &"b".into()).await.unwrap());
}

#[tokio::test]
async fn extend_fails_once_expired_even_without_takeover() {
    let fleet = Fleet::new();
    let a = fleet.instance();
    let cfg = lock("job", 0, 1);

    a.try_acquire(&cfg, &"a".into()).await.unwrap();
    fleet.clock.advance(secs(1));
    assert_eq!(
        a.extend("job", &"a".into(), secs(10)).await.unwrap(),
        ExtendOutcome::LostOwnership
    );
}

#[tokio::test]
async fn non_owner_release_is_a_no_op() {
    let fleet = Fleet::new();
    let (a, b) = (fleet.instance(), fleet.instance());
    let cfg = lock("job", 30, 50);

    a.try_acquire(&cfg, &"a".into()).await.unwrap();
    let before = a.get("job").await.unwrap().expect("row");

    for _ in 0..3 {
        fleet.clock.advance(secs(1));
        assert_eq!(
            b.release(&cfg, &"b".into()).await.unwrap(),
            ReleaseOutcome::NotOwner
        );
    }
    assert_eq!(a.get("job").await.unwrap(), Some(before));
}

#[tokio::test]
async fn release_of_never_acquired_lease_is_not_owner() {
    let fleet = Fleet::new();
    let a = fleet.instance();
    assert_eq!(
        a.release(&lock("ghost", 0, 5), &"a".into()).await.unwrap(),
        ReleaseOutcome::NotOwner
    );
    assert_eq!(a.get("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn leases_are_independent_per_name() {
    let fleet = Fleet::new();
    let (a, b) = (fleet.instance(), fleet.instance());

    assert!(a.try_acquire(&lock("one", 0, 50), &"a".into()).await.unwrap().is_acquired());
    assert!(b.try_acquire(&lock("two", 0, 50), &"b".into()).await.unwrap().is_acquired());
    assert_eq!(a.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn custom_table_name_is_used() {
    let fleet = Fleet::new();
    let options = StoreOptions {
        table: "job_locks".to_string(),
        ..StoreOptions::default()
    }
    .with_clock(DbClock::Manual(fleet.clock.clone()));
    let store = SqliteLeaseStore::open(&fleet.path, options).unwrap();
    assert_eq!(store.table(), "job_locks");
    assert!(store.try_acquire(&lock("job", 0, 5), &"a".into()).await.unwrap().is_acquired());

    // the default table on the same file is unaffected
    assert!(fleet.instance().list().await.unwrap().is_empty());
}
