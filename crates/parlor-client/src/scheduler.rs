use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Timer {
    id: u64,
    token: CancellationToken,
}

type Timers = Arc<Mutex<HashMap<String, Timer>>>;

/// Named, cancellable timers running as tokio tasks.
///
/// Scheduling a key replaces whatever was running under that key. Every timer
/// hangs off one root token, so dropping the scheduler stops them all.
pub struct Scheduler {
    root: CancellationToken,
    timers: Timers,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `task` every `period`, first after one full period.
    ///
    /// A tick that comes due while the previous run is still going is delayed,
    /// not stacked.
    pub fn every<F, Fut>(&self, key: &str, period: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (_, token) = self.install(key);
        let key = key.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => task().await,
                }
            }
            debug!("Timer {} stopped", key);
        });
    }

    /// Run `task` once after `delay`.
    pub fn after<F, Fut>(&self, key: &str, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (id, token) = self.install(key);
        let key = key.to_string();
        let timers = self.timers.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            // Deregister before running so the task may reschedule its own key.
            {
                let mut timers = lock(&timers);
                if timers.get(&key).is_some_and(|t| t.id == id) {
                    timers.remove(&key);
                }
            }
            task().await;
        });
    }

    pub fn cancel(&self, key: &str) {
        if let Some(timer) = lock(&self.timers).remove(key) {
            timer.token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.token.cancel();
        }
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        lock(&self.timers).contains_key(key)
    }

    fn install(&self, key: &str) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let previous = lock(&self.timers).insert(
            key.to_string(),
            Timer {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        (id, token)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<String, Timer>> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::future::Ready<()> + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        })
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn every_fires_each_period_until_cancelled() {
        let scheduler = Scheduler::new();
        let (hits, task) = counter();
        scheduler.every("poll", Duration::from_secs(10), task);

        advance(5).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        advance(10).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        advance(10).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        scheduler.cancel("poll");
        assert!(!scheduler.is_scheduled("poll"));
        advance(60).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_a_key_replaces_the_timer() {
        let scheduler = Scheduler::new();
        let (first, task) = counter();
        scheduler.after("refresh", Duration::from_secs(2), task);
        advance(1).await;

        let (second, task) = counter();
        scheduler.after("refresh", Duration::from_secs(2), task);
        assert!(scheduler.is_scheduled("refresh"));

        advance(5).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("refresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_stops_everything() {
        let scheduler = Scheduler::new();
        let (a, task_a) = counter();
        let (b, task_b) = counter();
        scheduler.every("a", Duration::from_secs(1), task_a);
        scheduler.after("b", Duration::from_secs(3), task_b);

        advance(2).await;
        drop(scheduler);
        advance(10).await;

        assert!(a.load(Ordering::SeqCst) >= 1);
        let after_drop = a.load(Ordering::SeqCst);
        advance(10).await;
        assert_eq!(a.load(Ordering::SeqCst), after_drop);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_key() {
        let scheduler = Scheduler::new();
        let (hits, task) = counter();
        scheduler.every("x", Duration::from_secs(1), task);
        let (_, task) = counter();
        scheduler.after("y", Duration::from_secs(1), task);

        scheduler.cancel_all();
        assert!(!scheduler.is_scheduled("x"));
        assert!(!scheduler.is_scheduled("y"));
        advance(5).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
