//! Per-identity async lifecycle locks.
//!
//! INVARIANT: per-identity operations hold the global lock shared plus their
//! identity lock; operations spanning every identity (logout) hold the global
//! lock exclusively.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use wapoll_core::ids::IdentityId;

/// Held for the duration of one per-identity operation.
pub(crate) struct IdentityGuard<'a> {
    _global: RwLockReadGuard<'a, ()>,
    _identity: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub(crate) struct IdentityLocks {
    global: RwLock<()>,
    per_identity: Mutex<HashMap<IdentityId, Weak<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    const PRUNE_THRESHOLD: usize = 64;

    fn acquire(&self, id: &IdentityId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.per_identity.lock();

        if locks.len() > Self::PRUNE_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(id).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        let _ = locks.insert(id.clone(), Arc::downgrade(&lock));
        lock
    }

    pub(crate) async fn lock_identity(&self, id: &IdentityId) -> IdentityGuard<'_> {
        let global = self.global.read().await;
        let identity = self.acquire(id).lock_owned().await;
        IdentityGuard {
            _global: global,
            _identity: identity,
        }
    }

    pub(crate) async fn lock_all(&self) -> RwLockWriteGuard<'_, ()> {
        self.global.write().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.per_identity
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_identity_serializes() {
        let locks = Arc::new(IdentityLocks::default());
        let id = IdentityId::from("dev_a");
        let guard = locks.lock_identity(&id).await;

        let locks2 = Arc::clone(&locks);
        let id2 = id.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock_identity(&id2).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_identities_do_not_block() {
        let locks = IdentityLocks::default();
        let _a = locks.lock_identity(&IdentityId::from("dev_a")).await;
        let _b = locks.lock_identity(&IdentityId::from("dev_b")).await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_not_retained() {
        let locks = IdentityLocks::default();
        {
            let _g = locks.lock_identity(&IdentityId::from("dev_a")).await;
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn lock_all_waits_for_identity_holders() {
        let locks = Arc::new(IdentityLocks::default());
        let guard = locks.lock_identity(&IdentityId::from("dev_a")).await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock_all().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
