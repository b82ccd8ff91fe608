use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Advisory, reentrant lock held while an upload or delete is in progress.
///
/// It only gates whether the reload queue may drain; it never blocks network
/// calls. Cloning shares the same counter.
#[derive(Clone, Default)]
pub struct UiLock {
    inner: Arc<LockInner>,
}

#[derive(Default)]
struct LockInner {
    count: AtomicUsize,
    released: Notify,
}

/// Releases one level of the lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct UiLockGuard {
    lock: UiLock,
}

impl UiLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> UiLockGuard {
        let depth = self.inner.count.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("[UI Lock] Locked (count: {})", depth);
        UiLockGuard { lock: self.clone() }
    }

    /// Decrement without a guard. Never goes below zero.
    pub fn release_one(&self) {
        let prev = self
            .inner
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1));
        match prev {
            Ok(1) => {
                log::debug!("[UI Lock] Unlocked (count: 0)");
                self.inner.released.notify_waiters();
            }
            Ok(prev) => log::debug!("[UI Lock] Unlocked (count: {})", prev - 1),
            Err(_) => {}
        }
    }

    pub fn is_held(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Run `fut` with the lock held. The guard is owned by the returned
    /// future, so the lock is released on success, error, panic or drop.
    pub async fn run_exclusive<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire();
        fut.await
    }

    /// Resolves once every holder has released.
    pub async fn wait_released(&self) {
        loop {
            let notified = self.inner.released.notified();
            if !self.is_held() {
                return;
            }
            notified.await;
        }
    }
}

impl UiLockGuard {
    pub fn release(self) {}
}

impl Drop for UiLockGuard {
    fn drop(&mut self) {
        self.lock.release_one();
    }
}
