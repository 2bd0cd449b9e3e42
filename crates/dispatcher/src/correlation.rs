use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use jobrelay_core::{DispatchError, DispatchResult};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::telemetry;

/// 一个在途任务的最终结果，由 Worker 响应或超时产生
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed(serde_json::Value),
    Failed(String),
    TimedOut,
}

/// 被取出的条目上挂着的定时器代次，定时器挂上之前就被解析时为 `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub timer: Option<u64>,
}

/// 关联表中的在途任务条目
#[derive(Debug)]
struct DispatchedJob {
    handler: oneshot::Sender<Resolution>,
    timer: Option<u64>,
    created_at: DateTime<Utc>,
    started: Instant,
}

/// 任务关联表：在途任务 id 到一次性完成句柄的映射。
///
/// 所有对内部映射的修改都在同一把锁下完成。`resolve_and_remove` 在锁内取出条目，
/// 因此同一 id 的 Worker 响应与超时并发到达时，只有先取到条目的一方会触发完成句柄。
#[derive(Debug)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, DispatchedJob>>,
    in_flight: watch::Sender<usize>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            entries: Mutex::default(),
            in_flight,
        }
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DispatchedJob>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_len(&self, len: usize) {
        metrics::gauge!(telemetry::JOBS_IN_FLIGHT).set(len as f64);
        self.in_flight.send_replace(len);
    }

    /// 登记在途任务，返回完成句柄的接收端。id 已存在时返回 `DuplicateJob`。
    pub fn register(&self, id: &str) -> DispatchResult<oneshot::Receiver<Resolution>> {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            return Err(DispatchError::DuplicateJob { id: id.to_string() });
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            id.to_string(),
            DispatchedJob {
                handler: tx,
                timer: None,
                created_at: Utc::now(),
                started: Instant::now(),
            },
        );
        self.publish_len(entries.len());
        debug!("登记在途任务 {}，当前在途数: {}", id, entries.len());

        Ok(rx)
    }

    /// 把超时定时器的代次挂到条目上。条目已不存在时返回 false，调用方应自行解除该定时器。
    pub fn attach_timer(&self, id: &str, generation: u64) -> bool {
        match self.lock().get_mut(id) {
            Some(job) => {
                job.timer = Some(generation);
                true
            }
            None => false,
        }
    }

    /// 原子地检查并移除条目；存在时以 `resolution` 触发其完成句柄并返回条目上的定时器代次，
    /// 不存在时无任何副作用并返回 `None`。
    pub fn resolve_and_remove(&self, id: &str, resolution: Resolution) -> Option<Resolved> {
        let job = self.take(id)?;
        Some(Self::fire(id, job, resolution))
    }

    /// 由代次为 `generation` 的定时器到期触发：只有条目仍属于该定时器（或尚未挂上定时器）时
    /// 才以 `TimedOut` 解析，避免旧定时器误伤复用同一 id 的新任务。
    pub fn expire(&self, id: &str, generation: u64) -> bool {
        match self.take_if(id, |job| job.timer.map_or(true, |g| g == generation)) {
            Some(job) => {
                Self::fire(id, job, Resolution::TimedOut);
                true
            }
            None => false,
        }
    }

    fn fire(id: &str, job: DispatchedJob, resolution: Resolution) -> Resolved {
        debug!(
            "任务 {} 已解析 (登记于 {}, 耗时 {:?})",
            id,
            job.created_at.to_rfc3339(),
            job.started.elapsed()
        );

        if job.handler.send(resolution).is_err() {
            warn!("任务 {} 的完成句柄已失效，结果被丢弃", id);
        }
        Resolved { timer: job.timer }
    }

    /// 移除条目而不触发完成句柄。重复移除是空操作。
    pub fn remove_if_present(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    fn take(&self, id: &str) -> Option<DispatchedJob> {
        self.take_if(id, |_| true)
    }

    fn take_if<P>(&self, id: &str, predicate: P) -> Option<DispatchedJob>
    where
        P: FnOnce(&DispatchedJob) -> bool,
    {
        let mut entries = self.lock();
        if !entries.get(id).is_some_and(predicate) {
            return None;
        }
        let job = entries.remove(id);
        self.publish_len(entries.len());
        job
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// 等待关联表清空；调用时已为空则立即返回
    pub async fn wait_until_empty(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // 发送端随关联表存活，不会返回错误
        let _ = in_flight.wait_for(|len| *len == 0).await;
    }
}
