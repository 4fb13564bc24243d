//! Locks guarding the shared build tree.
//!
//! Acquisition order is always tree (read) -> variant -> staging. The source
//! updater takes the tree write lock alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type VariantMap = HashMap<String, Arc<Mutex<()>>>;

/// Keyed acquire/release over the build tree.
#[derive(Default)]
pub struct BuildTreeLocks {
    tree: Arc<RwLock<()>>,
    staging: Arc<Mutex<()>>,
    /// Entries live only while a build holds or waits on them.
    variants: Arc<StdMutex<VariantMap>>,
}

fn lock_map(map: &StdMutex<VariantMap>) -> MutexGuard<'_, VariantMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by a build for its whole duration.
pub struct VariantLease {
    variant: Option<OwnedMutexGuard<()>>,
    key: String,
    map: Arc<StdMutex<VariantMap>>,
    _tree: OwnedRwLockReadGuard<()>,
}

impl Drop for VariantLease {
    fn drop(&mut self) {
        drop(self.variant.take());
        let mut map = lock_map(&self.map);
        // Only the map itself still references the mutex: nobody is waiting.
        if map.get(&self.key).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&self.key);
        }
    }
}

/// Held from config staging until the staged copies are scrubbed.
pub struct StagingLease {
    _guard: OwnedMutexGuard<()>,
}

/// Exclusive access to the whole tree.
pub struct TreeLease {
    _guard: OwnedRwLockWriteGuard<()>,
}

impl BuildTreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn variant_mutex(&self, variant: &str) -> Arc<Mutex<()>> {
        lock_map(&self.variants)
            .entry(variant.to_string())
            .or_default()
            .clone()
    }

    /// Shared tree access plus exclusive access to one variant.
    pub async fn acquire_variant(&self, variant: &str) -> VariantLease {
        let tree = self.tree.clone().read_owned().await;
        let guard = self.variant_mutex(variant).lock_owned().await;
        VariantLease {
            variant: Some(guard),
            key: variant.to_string(),
            map: self.variants.clone(),
            _tree: tree,
        }
    }

    /// Exclusive access to the tree-wide config staging locations.
    pub async fn acquire_staging(&self) -> StagingLease {
        StagingLease {
            _guard: self.staging.clone().lock_owned().await,
        }
    }

    /// Wait for every in-flight build, then hold the tree alone.
    pub async fn acquire_exclusive(&self) -> TreeLease {
        TreeLease {
            _guard: self.tree.clone().write_owned().await,
        }
    }

    /// Exclusive tree access if no build currently holds it.
    pub fn try_exclusive(&self) -> Option<TreeLease> {
        self.tree
            .clone()
            .try_write_owned()
            .ok()
            .map(|guard| TreeLease { _guard: guard })
    }

    /// Whether a build for `variant` is in flight.
    pub fn is_variant_busy(&self, variant: &str) -> bool {
        lock_map(&self.variants)
            .get(variant)
            .is_some_and(|m| m.try_lock().is_err())
    }

    #[cfg(test)]
    fn tracked_variants(&self) -> usize {
        lock_map(&self.variants).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_variant_is_serialized() {
        let locks = Arc::new(BuildTreeLocks::new());
        let lease = locks.acquire_variant("tbeam").await;
        assert!(locks.is_variant_busy("tbeam"));
        assert!(!locks.is_variant_busy("rak4631"));

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _lease = locks.acquire_variant("tbeam").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_released_variants_are_forgotten() {
        let locks = Arc::new(BuildTreeLocks::new());
        for i in 0..50 {
            let _lease = locks.acquire_variant(&format!("client-variant-{i}")).await;
        }
        assert_eq!(locks.tracked_variants(), 0);

        // A queued build keeps the entry alive until it has run too.
        let lease = locks.acquire_variant("tbeam").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _lease = locks.acquire_variant("tbeam").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(lease);
        assert_eq!(locks.tracked_variants(), 1);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.tracked_variants(), 0);
        assert!(!locks.is_variant_busy("tbeam"));
    }

    #[tokio::test]
    async fn test_different_variants_run_concurrently() {
        let locks = BuildTreeLocks::new();
        let _a = locks.acquire_variant("tbeam").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire_variant("t-echo"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_excludes_builds() {
        let locks = BuildTreeLocks::new();
        let lease = locks.acquire_variant("tbeam").await;
        assert!(locks.try_exclusive().is_none());
        drop(lease);

        let exclusive = locks.try_exclusive();
        assert!(exclusive.is_some());
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire_variant("tbeam")).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_staging_is_tree_wide() {
        let locks = BuildTreeLocks::new();
        let _staged = locks.acquire_staging().await;
        let second =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire_staging()).await;
        assert!(second.is_err());
    }
}
