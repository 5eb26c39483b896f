//! Per-key lock registry.
//!
//! Some Vault objects behave like singletons (identity aliases share one
//! lookup table), so concurrent writes to them must be serialized. The
//! registry is owned by the provider instance and handed to handlers through
//! the provider context.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the lock for `key`. The lock is released when
    /// the guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!("Waiting for lock on {}", key);
        mutex.lock_owned().await
    }

    /// Number of distinct keys that have been locked so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
