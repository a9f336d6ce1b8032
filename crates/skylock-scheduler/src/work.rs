use std::future::Future;

use futures_util::future::BoxFuture;

use crate::guard::LeaseGuard;

/// The business logic guarded by a lease.
///
/// Long-running work should call [`LeaseGuard::extend`] before `max_hold`
/// runs out and stop when it reports `LostOwnership`; nothing preempts work
/// whose lease has expired.
pub trait Work: Send + Sync {
    fn run(&self, guard: LeaseGuard) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Any `Fn(LeaseGuard) -> impl Future<Output = anyhow::Result<()>>` is work.
impl<F, Fut> Work for F
where
    F: Fn(LeaseGuard) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self, guard: LeaseGuard) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self(guard))
    }
}
