use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 单个任务从分发到完成的最长时间（毫秒）
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 60_000;

/// 直接发布到总线的最大序列化大小，达到或超过则走对象存储暂存
pub const DEFAULT_MAX_DIRECT_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub job_timeout_ms: u64,
    pub max_direct_payload_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            job_timeout_ms: DEFAULT_JOB_TIMEOUT_MS,
            max_direct_payload_bytes: DEFAULT_MAX_DIRECT_PAYLOAD_BYTES,
        }
    }
}

impl DispatcherConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Validate dispatcher configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job_timeout_ms == 0 {
            return Err(anyhow::anyhow!("任务超时时间必须大于0"));
        }

        if self.max_direct_payload_bytes == 0 {
            return Err(anyhow::anyhow!("直接发布大小阈值必须大于0"));
        }

        Ok(())
    }
}
