use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::Result;

use super::lock::UiLock;
use super::types::CourseFilter;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// What the drain worker does with a request popped while the UI lock is held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedPolicy {
    /// Discard the request; the slots stay stale until the next reload.
    #[default]
    Drop,
    /// Wait for the lock to be released, then run the request.
    Defer,
}

impl std::str::FromStr for LockedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(LockedPolicy::Drop),
            "defer" => Ok(LockedPolicy::Defer),
            other => Err(format!("unknown locked policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Minimum spacing between the starts of two dequeued requests.
    pub debounce: Duration,
    pub locked: LockedPolicy,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            locked: LockedPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub seq: u64,
    pub programme: String,
    pub level: String,
    pub course: String,
    pub enqueued_at: Instant,
}

impl ReloadRequest {
    pub fn filter(&self) -> CourseFilter {
        CourseFilter::new(&self.programme, &self.level, &self.course)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub executed: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// The reload body run for each executed request.
pub type ReloadFn = Arc<dyn Fn(ReloadRequest) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct QueueState {
    pending: VecDeque<ReloadRequest>,
    draining: bool,
    last_start: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    executed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Debounced FIFO of "reload materials for a course" requests, drained by a
/// single worker task.
pub struct ReloadQueue {
    policy: QueuePolicy,
    lock: UiLock,
    reload: ReloadFn,
    state: Mutex<QueueState>,
    next_seq: AtomicU64,
    counters: Counters,
    idle: Notify,
}

impl ReloadQueue {
    pub fn new(policy: QueuePolicy, lock: UiLock, reload: ReloadFn) -> Arc<Self> {
        Arc::new(Self {
            policy,
            lock,
            reload,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                draining: false,
                last_start: None,
            }),
            next_seq: AtomicU64::new(1),
            counters: Counters::default(),
            idle: Notify::new(),
        })
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Append a request and start the drain worker if it is not running.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(self: &Arc<Self>, programme: &str, level: &str, course: &str) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let request = ReloadRequest {
            seq,
            programme: programme.to_string(),
            level: level.to_string(),
            course: course.to_string(),
            enqueued_at: Instant::now(),
        };
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);

        let start_worker = {
            let mut state = self.state();
            state.pending.push_back(request);
            !std::mem::replace(&mut state.draining, true)
        };
        log::debug!(
            "[Materials Queue] Enqueued #{} {}/{}/{}",
            seq,
            programme,
            level,
            course
        );

        if start_worker {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }
        seq
    }

    /// Drop every pending request. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = {
            let mut state = self.state();
            let count = state.pending.len();
            state.pending.clear();
            count
        };
        log::info!("[Materials Queue] Cleared {} pending calls", count);
        count
    }

    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            executed: self.counters.executed.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Resolves once the worker has stopped with nothing pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            {
                let state = self.state();
                if !state.draining && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A panic inside the lock cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pop the next request once the debounce interval has passed, or mark the
    /// worker stopped when nothing is left.
    async fn next_request(&self) -> Option<ReloadRequest> {
        let wait = {
            let mut state = self.state();
            if state.pending.is_empty() {
                state.draining = false;
                return None;
            }
            state
                .last_start
                .map(|t| self.policy.debounce.saturating_sub(t.elapsed()))
                .unwrap_or(Duration::ZERO)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut state = self.state();
        match state.pending.pop_front() {
            Some(request) => {
                state.last_start = Some(Instant::now());
                Some(request)
            }
            None => {
                state.draining = false;
                None
            }
        }
    }

    async fn drain(self: Arc<Self>) {
        while let Some(request) = self.next_request().await {
            if self.lock.is_held() {
                match self.policy.locked {
                    LockedPolicy::Drop => {
                        log::info!(
                            "[Materials Queue] Skipping #{} - UI is locked",
                            request.seq
                        );
                        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    LockedPolicy::Defer => {
                        log::info!(
                            "[Materials Queue] Deferring #{} until UI lock is released",
                            request.seq
                        );
                        self.lock.wait_released().await;
                    }
                }
            }

            let seq = request.seq;
            match (self.reload)(request).await {
                Ok(()) => {
                    self.counters.executed.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    self.counters.executed.fetch_add(1, Ordering::SeqCst);
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    log::error!("[Materials Queue] Error processing #{}: {}", seq, e);
                }
            }
        }
        self.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use futures_util::FutureExt;

    type Log = Arc<Mutex<Vec<(u64, String, Instant)>>>;

    fn recording(log: Log) -> ReloadFn {
        Arc::new(move |req: ReloadRequest| {
            let log = log.clone();
            async move {
                log.lock()
                    .unwrap()
                    .push((req.seq, req.course.clone(), Instant::now()));
                if req.course == "FAIL" {
                    return Err(PortalError::Rejected("boom".into()));
                }
                Ok(())
            }
            .boxed()
        })
    }

    fn queue(policy: QueuePolicy, lock: UiLock) -> (Arc<ReloadQueue>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        (ReloadQueue::new(policy, lock, recording(log.clone())), log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_executes_in_enqueue_order() {
        let (q, log) = queue(QueuePolicy::default(), UiLock::new());
        for course in ["MET201", "MET202", "MET201", "MET203"] {
            q.enqueue("Meteorology", "200", course);
        }
        q.wait_idle().await;

        let seen: Vec<_> = log.lock().unwrap().iter().map(|e| e.1.clone()).collect();
        assert_eq!(seen, vec!["MET201", "MET202", "MET201", "MET203"]);
        assert_eq!(q.stats().executed, 4);
        assert!(!q.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_are_spaced_by_debounce() {
        let (q, log) = queue(QueuePolicy::default(), UiLock::new());
        q.enqueue("P", "100", "A");
        q.enqueue("P", "100", "B");
        q.enqueue("P", "100", "C");
        q.wait_idle().await;

        let starts: Vec<Instant> = log.lock().unwrap().iter().map(|e| e.2).collect();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= DEFAULT_DEBOUNCE);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_requests_while_locked() {
        let lock = UiLock::new();
        let (q, log) = queue(QueuePolicy::default(), lock.clone());

        let guard = lock.acquire();
        q.enqueue("Meteorology", "200", "MET201");
        q.wait_idle().await;

        assert!(log.lock().unwrap().is_empty());
        assert!(q.is_empty());
        assert_eq!(q.stats().dropped, 1);
        drop(guard);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_policy_runs_after_release() {
        let lock = UiLock::new();
        let policy = QueuePolicy {
            locked: LockedPolicy::Defer,
            ..QueuePolicy::default()
        };
        let (q, log) = queue(policy, lock.clone());

        let guard = lock.acquire();
        q.enqueue("Meteorology", "200", "MET201");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(log.lock().unwrap().is_empty());

        drop(guard);
        q.wait_idle().await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(q.stats().dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_drain() {
        let (q, log) = queue(QueuePolicy::default(), UiLock::new());
        q.enqueue("P", "100", "FAIL");
        q.enqueue("P", "100", "OK");
        q.wait_idle().await;

        assert_eq!(log.lock().unwrap().len(), 2);
        let stats = q.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.executed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_going_idle() {
        let (q, log) = queue(QueuePolicy::default(), UiLock::new());
        q.enqueue("P", "100", "A");
        q.wait_idle().await;
        assert!(!q.is_draining());

        q.enqueue("P", "100", "B");
        q.wait_idle().await;
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_pending() {
        let lock = UiLock::new();
        let policy = QueuePolicy {
            locked: LockedPolicy::Defer,
            ..QueuePolicy::default()
        };
        let (q, log) = queue(policy, lock.clone());

        let guard = lock.acquire();
        q.enqueue("P", "100", "A");
        q.enqueue("P", "100", "B");
        q.enqueue("P", "100", "C");
        tokio::time::sleep(Duration::from_millis(500)).await;
        // "A" is parked waiting on the lock; the rest are still queued.
        assert_eq!(q.clear(), 2);
        drop(guard);
        q.wait_idle().await;

        let seen: Vec<_> = log.lock().unwrap().iter().map(|e| e.1.clone()).collect();
        assert_eq!(seen, vec!["A"]);
    }

    #[test]
    fn test_policy_parses() {
        assert_eq!("Defer".parse::<LockedPolicy>(), Ok(LockedPolicy::Defer));
        assert_eq!("drop".parse::<LockedPolicy>(), Ok(LockedPolicy::Drop));
        assert!("retry".parse::<LockedPolicy>().is_err());
        assert!(QueuePolicy::default().debounce == Duration::from_millis(100));
    }
}
