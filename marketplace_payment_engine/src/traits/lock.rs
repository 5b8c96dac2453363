use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Timed out after {0:?} waiting for lock [{1}]")]
    Timeout(Duration, String),
    #[error("Lock service failure: {0}")]
    Backend(String),
}

/// A distributed lock service providing mutual exclusion per string key across every process that shares the
/// backend. In a single-process deployment this may degrade to in-memory mutexes
/// ([`crate::mem::MemoryLockService`]); a production backend must be safe across processes.
///
/// Waiting for a lock is always bounded: a holder that never releases surfaces as [`LockError::Timeout`] at the
/// caller rather than hanging it forever. The lock is released when the returned guard is dropped, which also covers
/// every error path in the critical section.
#[allow(async_fn_in_trait)]
pub trait LockService: Clone + Send + Sync + 'static {
    type Guard: Send;

    fn acquire(
        &self,
        key: &str,
        wait: Duration,
    ) -> impl std::future::Future<Output = Result<Self::Guard, LockError>> + Send;
}
