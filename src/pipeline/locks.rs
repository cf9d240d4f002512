//! Per-collection run serialization.
//!
//! One async mutex per collection name, created lazily and kept for the
//! pipeline's lifetime. Runs on the same collection queue behind the
//! mutex; runs on different collections proceed in parallel. The guard is
//! owned, so it can be held across the await points of a full run.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct CollectionLocks {
    entries: Mutex<FxHashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
    fn entry(&self, collection: &str) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry(collection.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to `collection`.
    pub(crate) async fn acquire(&self, collection: &str) -> OwnedMutexGuard<()> {
        self.entry(collection).lock_owned().await
    }

    /// Whether a run currently holds the lock. Point-in-time answer, the
    /// state may flip right after probing.
    pub(crate) fn is_locked(&self, collection: &str) -> bool {
        self.entry(collection).try_lock().is_err()
    }
}
