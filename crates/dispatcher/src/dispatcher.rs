use std::sync::Arc;
use std::time::Duration;

use jobrelay_core::{
    AppConfig, BlobStore, Delivery, DispatchError, JobRequest, MessageBus, ProducerChannel,
    ProducerEvent, WorkerEnvelope,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::correlation::{CorrelationTable, Resolution};
use crate::jobs::{JobHandler, JobRegistry};
use crate::response_router::ResponseRouter;
use crate::telemetry;
use crate::timeout_supervisor::TimeoutSupervisor;
use crate::transport::TransportSelector;

/// `submit` 的同步结果。最终的任务结果总是通过生产者通道异步上报。
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// 已交给传输层，等待 Worker 响应或超时
    Dispatched(Delivery),
    /// 校验或负载准备失败，已上报 JobFailed
    Rejected(String),
    /// 未知任务类型，已上报 NotPermitted
    NotPermitted,
    /// 传输失败，已上报 JobFailed
    SendFailed(String),
}

impl SubmitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, SubmitOutcome::Dispatched(_))
    }
}

/// 任务分发器
///
/// 负责校验请求、经传输选择器发送、登记关联表条目并设置超时定时器。
/// 每个成功发送的任务会派生一个续延任务，等待一次性的 [`Resolution`]，
/// 完成本地落地后向生产者上报唯一的结果事件。
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    table: Arc<CorrelationTable>,
    supervisor: Arc<TimeoutSupervisor>,
    transport: TransportSelector,
    producer: Arc<dyn ProducerChannel>,
    job_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<JobRegistry>,
        transport: TransportSelector,
        producer: Arc<dyn ProducerChannel>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            table: Arc::new(CorrelationTable::new()),
            supervisor: Arc::new(TimeoutSupervisor::new()),
            transport,
            producer,
            job_timeout,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        registry: Arc<JobRegistry>,
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
        producer: Arc<dyn ProducerChannel>,
    ) -> Self {
        let transport = TransportSelector::from_config(config, bus, blobs);
        Self::new(registry, transport, producer, config.dispatcher.job_timeout())
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn supervisor(&self) -> &Arc<TimeoutSupervisor> {
        &self.supervisor
    }

    pub fn transport(&self) -> &TransportSelector {
        &self.transport
    }

    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// 共享同一关联表与超时监督器的响应路由器
    pub fn router(&self) -> ResponseRouter {
        ResponseRouter::new(Arc::clone(&self.table), Arc::clone(&self.supervisor))
    }

    #[instrument(skip(self, request), fields(job_id = %request.id, job_type = %request.job_type_name))]
    pub async fn submit(&self, request: JobRequest) -> SubmitOutcome {
        let handler = match self.registry.resolve(&request.job_type_name) {
            Ok(handler) => handler,
            Err(e) => {
                warn!("拒绝任务 {}: {}", request.id, e);
                metrics::counter!(telemetry::JOBS_REJECTED, "reason" => "not_permitted").increment(1);
                self.producer.report(ProducerEvent::NotPermitted {
                    id: request.id,
                    job_type_name: request.job_type_name,
                });
                return SubmitOutcome::NotPermitted;
            }
        };

        if let Err(e) = handler.validate(&request) {
            return self.reject(&request.id, "validation", e);
        }

        // 在任何 I/O 之前发现重复 id；拒绝事件与仍在途的同 id 任务共用 id
        if self.table.contains(&request.id) {
            let e = DispatchError::DuplicateJob {
                id: request.id.clone(),
            };
            error!("生产者复用了在途任务 id {}，新请求被拒绝", request.id);
            return self.reject(&request.id, "duplicate", e);
        }

        let payload = match handler.prepare(&request).await {
            Ok(payload) => payload,
            Err(e) => return self.reject(&request.id, "prepare", e),
        };

        let envelope = WorkerEnvelope::new(
            request.id.clone(),
            handler.job_type(),
            self.transport.work_topic(),
            payload,
        );
        let source_ref = handler.source_reference(&request);

        // 先登记再发送，避免 Worker 响应先于条目到达；发送失败时撤销
        let receiver = match self.table.register(&request.id) {
            Ok(receiver) => receiver,
            Err(e) => {
                error!("生产者复用了在途任务 id {}，新请求被拒绝", request.id);
                return self.reject(&request.id, "duplicate", e);
            }
        };

        let delivery = match self.transport.send(&envelope).await {
            Ok(delivery) => delivery,
            Err(e) => {
                self.table.remove_if_present(&request.id);
                error!("任务 {} 发送失败: {}", request.id, e);
                metrics::counter!(telemetry::JOBS_REJECTED, "reason" => "transport").increment(1);
                let message = e.to_string();
                self.producer.report(ProducerEvent::JobFailed {
                    id: request.id,
                    error: message.clone(),
                });
                return SubmitOutcome::SendFailed(message);
            }
        };

        self.arm_timeout(&request.id);
        metrics::counter!(telemetry::JOBS_DISPATCHED, "transport" => delivery.label()).increment(1);
        info!(
            "任务 {} 已分发 ({}，{} 字节)，超时 {:?}",
            request.id,
            delivery.label(),
            match &delivery {
                Delivery::Direct { bytes } | Delivery::Staged { bytes, .. } => *bytes,
            },
            self.job_timeout
        );

        self.spawn_continuation(request, handler, source_ref, receiver);
        SubmitOutcome::Dispatched(delivery)
    }

    fn reject(&self, id: &str, reason: &'static str, e: DispatchError) -> SubmitOutcome {
        warn!("任务 {} 被拒绝: {}", id, e);
        metrics::counter!(telemetry::JOBS_REJECTED, "reason" => reason).increment(1);
        let message = e.to_string();
        self.producer.report(ProducerEvent::JobFailed {
            id: id.to_string(),
            error: message.clone(),
        });
        SubmitOutcome::Rejected(message)
    }

    fn arm_timeout(&self, id: &str) {
        let table = Arc::clone(&self.table);
        let job_id = id.to_string();
        let generation = self.supervisor.arm(id, self.job_timeout, move |generation| {
            if table.expire(&job_id, generation) {
                warn!("任务 {} 在截止时间内未收到响应", job_id);
            }
        });

        // 响应可能在设置定时器之前就已到达
        if !self.table.attach_timer(id, generation) {
            debug!("任务 {} 在设置定时器前已解析", id);
            self.supervisor.disarm(id, generation);
        }
    }

    fn spawn_continuation(
        &self,
        request: JobRequest,
        handler: Arc<dyn JobHandler>,
        source_ref: String,
        receiver: oneshot::Receiver<Resolution>,
    ) {
        let producer = Arc::clone(&self.producer);

        tokio::spawn(async move {
            let Ok(resolution) = receiver.await else {
                debug!("任务 {} 的完成句柄在解析前被丢弃", request.id);
                return;
            };

            match resolution {
                Resolution::Completed(result) => match handler.finalize(&request, result).await {
                    Ok(output) => {
                        metrics::counter!(telemetry::JOBS_RESOLVED, "outcome" => "completed")
                            .increment(1);
                        info!("任务 {} 执行完成", request.id);
                        producer.report(ProducerEvent::JobCompleted {
                            id: request.id,
                            result: output,
                        });
                    }
                    Err(e) => {
                        // 任务已解析，结果落地失败只记录日志，不再上报
                        metrics::counter!(telemetry::JOBS_RESOLVED, "outcome" => "finalization_failed")
                            .increment(1);
                        error!("任务 {} 的结果落地失败: {}", request.id, e);
                    }
                },
                Resolution::Failed(error) => {
                    metrics::counter!(telemetry::JOBS_RESOLVED, "outcome" => "failed").increment(1);
                    warn!("任务 {} 执行失败: {}", request.id, error);
                    producer.report(ProducerEvent::JobFailed {
                        id: request.id,
                        error,
                    });
                }
                Resolution::TimedOut => {
                    metrics::counter!(telemetry::JOBS_RESOLVED, "outcome" => "timed_out").increment(1);
                    let error = DispatchError::Timeout {
                        id: request.id.clone(),
                        source_ref,
                    };
                    producer.report(ProducerEvent::JobFailed {
                        id: request.id,
                        error: error.to_string(),
                    });
                }
            }
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("in_flight", &self.table.len())
            .field("armed_timers", &self.supervisor.armed_count())
            .field("transport", &self.transport)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}
