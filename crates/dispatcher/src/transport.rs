use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use jobrelay_core::{
    AppConfig, BlobStore, Delivery, DispatchResult, MessageBus, StagedPointer, WorkerEnvelope,
};
use tracing::{debug, info, instrument};

/// 投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Direct,
    Staged,
}

/// 传输选择器
///
/// 序列化后的信封小于阈值时直接发布到工作主题；否则以 base64 写入对象存储
/// （bucket 由工作主题派生，key 为 `event-<jobId>`），再在工作主题上发布一个
/// [`StagedPointer`] 供 Worker 定位暂存对象。
pub struct TransportSelector {
    bus: Arc<dyn MessageBus>,
    blobs: Arc<dyn BlobStore>,
    work_topic: String,
    staging_bucket: String,
    max_direct_bytes: usize,
}

impl TransportSelector {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
        work_topic: impl Into<String>,
        staging_bucket: impl Into<String>,
        max_direct_bytes: usize,
    ) -> Self {
        Self {
            bus,
            blobs,
            work_topic: work_topic.into(),
            staging_bucket: staging_bucket.into(),
            max_direct_bytes,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self::new(
            bus,
            blobs,
            config.message_bus.work_topic.clone(),
            config.staging_bucket(),
            config.dispatcher.max_direct_payload_bytes,
        )
    }

    pub fn work_topic(&self) -> &str {
        &self.work_topic
    }

    pub fn staging_bucket(&self) -> &str {
        &self.staging_bucket
    }

    pub fn threshold(&self) -> usize {
        self.max_direct_bytes
    }

    /// 严格小于阈值走直接发布，等于阈值即走暂存
    pub fn choose(&self, serialized_len: usize) -> TransportKind {
        if serialized_len < self.max_direct_bytes {
            TransportKind::Direct
        } else {
            TransportKind::Staged
        }
    }

    pub fn staging_key(job_id: &str) -> String {
        format!("event-{}", job_id)
    }

    /// 发送信封，返回投递回执。任何总线或对象存储失败都原样返回，不做重试。
    #[instrument(skip(self, envelope), fields(job_id = %envelope.job_id))]
    pub async fn send(&self, envelope: &WorkerEnvelope) -> DispatchResult<Delivery> {
        let bytes = envelope.serialize_bytes()?;
        let size = bytes.len();

        match self.choose(size) {
            TransportKind::Direct => {
                self.bus.publish(&self.work_topic, &bytes).await?;
                debug!(
                    "任务 {} 已直接发布到主题 {} ({} 字节)",
                    envelope.job_id, self.work_topic, size
                );
                Ok(Delivery::Direct { bytes: size })
            }
            TransportKind::Staged => {
                let key = Self::staging_key(&envelope.job_id);
                let encoded = STANDARD.encode(&bytes);
                self.blobs
                    .put(&self.staging_bucket, &key, encoded.into_bytes())
                    .await?;

                let pointer = StagedPointer {
                    job_id: envelope.job_id.clone(),
                    topic_hint: envelope.topic_hint.clone(),
                    bucket: self.staging_bucket.clone(),
                    key: key.clone(),
                };
                let pointer_bytes = serde_json::to_vec(&pointer)?;
                self.bus.publish(&self.work_topic, &pointer_bytes).await?;

                info!(
                    "任务 {} 负载 {} 字节超过阈值 {}，已暂存至 {}/{}",
                    envelope.job_id, size, self.max_direct_bytes, self.staging_bucket, key
                );
                Ok(Delivery::Staged {
                    bucket: self.staging_bucket.clone(),
                    key,
                    bytes: size,
                })
            }
        }
    }
}

impl std::fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSelector")
            .field("work_topic", &self.work_topic)
            .field("staging_bucket", &self.staging_bucket)
            .field("max_direct_bytes", &self.max_direct_bytes)
            .finish()
    }
}
