use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::{LockError, LockService};

/// String-keyed async mutexes. Mutual exclusion only holds within one process.
#[derive(Clone, Default)]
pub struct MemoryLockService {
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LockService for MemoryLockService {
    type Guard = OwnedMutexGuard<()>;

    async fn acquire(&self, key: &str, wait: Duration) -> Result<Self::Guard, LockError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|e| LockError::Backend(e.to_string()))?;
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| LockError::Timeout(wait, key.to_string()))
    }
}
