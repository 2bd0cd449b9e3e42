use std::sync::Arc;

use futures::StreamExt;
use jobrelay_core::{Subscription, WorkerResponse};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::correlation::{CorrelationTable, Resolution};
use crate::telemetry;
use crate::timeout_supervisor::TimeoutSupervisor;

/// 单条响应的路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 命中在途任务并完成解析
    Resolved,
    /// 任务已被解析（超时或重复响应），响应被丢弃
    Late,
    /// 无法识别的响应
    Ignored,
}

/// Worker 响应路由器
#[derive(Debug, Clone)]
pub struct ResponseRouter {
    table: Arc<CorrelationTable>,
    supervisor: Arc<TimeoutSupervisor>,
}

impl ResponseRouter {
    pub fn new(table: Arc<CorrelationTable>, supervisor: Arc<TimeoutSupervisor>) -> Self {
        Self { table, supervisor }
    }

    pub fn route(&self, response: WorkerResponse) -> RouteOutcome {
        debug!("收到任务 {} 的 Worker 响应", response.job_id().unwrap_or("<无>"));
        match response {
            WorkerResponse::Completed { job_id, result } => {
                let outcome = self.resolve(&job_id, Resolution::Completed(result));
                if outcome == RouteOutcome::Late {
                    info!("任务 {} 已不在途，丢弃迟到或重复的完成响应", job_id);
                }
                outcome
            }
            WorkerResponse::Failed { job_id, error } => {
                let outcome = self.resolve(&job_id, Resolution::Failed(error));
                if outcome == RouteOutcome::Late {
                    debug!("任务 {} 已不在途，丢弃失败响应", job_id);
                }
                outcome
            }
            WorkerResponse::Unrecognized {
                message_type,
                job_id,
            } => {
                warn!(
                    "收到无法识别的 Worker 响应，类型: {}，任务: {}",
                    message_type,
                    job_id.as_deref().unwrap_or("<无>")
                );
                RouteOutcome::Ignored
            }
        }
    }

    pub fn route_bytes(&self, bytes: &[u8]) -> RouteOutcome {
        match WorkerResponse::from_bytes(bytes) {
            Ok(response) => self.route(response),
            Err(e) => {
                warn!("丢弃无法解析的 Worker 响应: {}", e);
                RouteOutcome::Ignored
            }
        }
    }

    fn resolve(&self, job_id: &str, resolution: Resolution) -> RouteOutcome {
        match self.table.resolve_and_remove(job_id, resolution) {
            Some(resolved) => {
                // 定时器尚未挂上时由分发器在挂载失败后解除
                if let Some(generation) = resolved.timer {
                    self.supervisor.disarm(job_id, generation);
                }
                RouteOutcome::Resolved
            }
            None => {
                metrics::counter!(telemetry::LATE_RESPONSES).increment(1);
                RouteOutcome::Late
            }
        }
    }

    /// 持续消费响应订阅，直到流结束或收到关闭信号。
    /// 每条消息无论路由结果如何都会被确认。
    pub async fn run(&self, mut subscription: Subscription, mut shutdown: broadcast::Receiver<()>) {
        info!("响应路由器已启动");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("响应路由器收到关闭信号");
                    break;
                }
                next = subscription.next() => match next {
                    Some(message) => {
                        let outcome = self.route_bytes(&message.data);
                        debug!("响应路由结果: {:?}", outcome);
                        if let Err(e) = message.ack().await {
                            warn!("确认响应消息失败: {}", e);
                        }
                    }
                    None => {
                        warn!("响应订阅流已结束");
                        break;
                    }
                },
            }
        }

        info!("响应路由器已停止，剩余在途任务: {}", self.table.len());
    }
}
