//! Per-job deadline timers.
//!
//! Each armed timer is a tokio task that sleeps until the deadline and then runs its
//! callback with the generation it was armed under. Generations are unique per
//! supervisor, so disarming by `(id, generation)` never touches a later timer for a
//! reused id. The callback for a dispatched job goes through
//! [`CorrelationTable::expire`](crate::CorrelationTable::expire), so a timer firing
//! after the worker already answered is a no-op even if it was never disarmed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, instrument};

type TimerMap = HashMap<String, (u64, JoinHandle<()>)>;

/// 任务超时监督器
#[derive(Debug, Default)]
pub struct TimeoutSupervisor {
    timers: Arc<Mutex<TimerMap>>,
    generation: AtomicU64,
}

fn lock(timers: &Mutex<TimerMap>) -> MutexGuard<'_, TimerMap> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 `id` 设置定时器，`deadline` 到期前未被解除则以定时器代次调用 `on_timeout`。
    /// 对同一 id 重复设置会替换之前的定时器。返回本次设置的代次。
    #[instrument(skip(self, on_timeout))]
    pub fn arm<F>(&self, id: &str, deadline: Duration, on_timeout: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let key = id.to_string();

        // 持锁期间完成 spawn 与登记，到期任务的自我清理会等待登记完成
        let mut guard = lock(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            {
                let mut timers = lock(&timers);
                if matches!(timers.get(&key), Some((g, _)) if *g == generation) {
                    timers.remove(&key);
                }
            }
            debug!("任务 {} 的定时器到期", key);
            on_timeout(generation);
        });

        if let Some((_, previous)) = guard.insert(id.to_string(), (generation, handle)) {
            previous.abort();
        }
        generation
    }

    /// 解除 `id` 上代次为 `generation` 的定时器，返回是否解除了待触发的定时器。
    /// 该 id 已换成其他代次的定时器时不做任何事。
    pub fn disarm(&self, id: &str, generation: u64) -> bool {
        let mut timers = lock(&self.timers);
        match timers.get(id) {
            Some((g, _)) if *g == generation => {}
            _ => return false,
        }
        match timers.remove(id) {
            Some((_, handle)) => {
                handle.abort();
                debug!("已解除任务 {} 的定时器 (代次 {})", id, generation);
                true
            }
            None => false,
        }
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// 解除全部定时器，返回解除的数量
    pub fn disarm_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.timers).drain().collect();
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        drained.len()
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce(u64) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let supervisor = TimeoutSupervisor::new();
        let (fired, callback) = counter();

        supervisor.arm("a1", Duration::from_secs(60), callback);
        assert_eq!(supervisor.armed_count(), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let supervisor = TimeoutSupervisor::new();
        let (fired, callback) = counter();

        let generation = supervisor.arm("a1", Duration::from_secs(60), callback);
        assert!(supervisor.disarm("a1", generation));
        assert!(!supervisor.disarm("a1", generation));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let supervisor = TimeoutSupervisor::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();

        let stale = supervisor.arm("a1", Duration::from_secs(10), first_cb);
        let current = supervisor.arm("a1", Duration::from_secs(30), second_cb);
        assert_ne!(stale, current);
        assert_eq!(supervisor.armed_count(), 1);

        // 旧代次的解除不影响新定时器
        assert!(!supervisor.disarm("a1", stale));
        assert_eq!(supervisor.armed_count(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_receives_generation() {
        let supervisor = TimeoutSupervisor::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);

        let generation = supervisor.arm("a1", Duration::from_secs(1), move |g| {
            *sink.lock().unwrap() = Some(g);
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock().unwrap(), Some(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_all() {
        let supervisor = TimeoutSupervisor::new();
        let (fired_a, cb_a) = counter();
        let (fired_b, cb_b) = counter();

        supervisor.arm("a", Duration::from_secs(5), cb_a);
        supervisor.arm("b", Duration::from_secs(5), cb_b);
        assert_eq!(supervisor.disarm_all(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired_a.load(Ordering::SeqCst), 0);
        assert_eq!(fired_b.load(Ordering::SeqCst), 0);
    }
}
