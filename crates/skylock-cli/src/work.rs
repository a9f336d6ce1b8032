use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use skylock_scheduler::{LeaseGuard, Work};
use tracing::info;

/// Stand-in job body for configured tasks: touches the lease database, sleeps
/// for `work_for`, then checks it still owns the lease.
pub struct DemoWork {
    db_path: PathBuf,
    work_for: Duration,
}

impl DemoWork {
    pub fn new(db_path: impl Into<PathBuf>, work_for: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            work_for,
        }
    }
}

impl Work for DemoWork {
    fn run(&self, guard: LeaseGuard) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let lease = guard.lease();
            info!(
                task = %lease.name,
                holder = %guard.holder(),
                lock_until = %lease.lock_until,
                "job started"
            );

            let path = self.db_path.clone();
            let one: i64 = tokio::task::spawn_blocking(move || {
                let conn = rusqlite::Connection::open(path)?;
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await??;
            anyhow::ensure!(one == 1, "database probe returned {one}");

            tokio::time::sleep(self.work_for).await;
            guard.assert_locked().await?;

            info!(task = %guard.lock().name(), "job finished");
            Ok(())
        })
    }
}
