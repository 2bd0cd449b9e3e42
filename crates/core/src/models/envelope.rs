use serde::{Deserialize, Serialize};

use super::JobType;

/// 发送给 Worker 的任务信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEnvelope {
    pub job_id: String,
    pub job_type: JobType,
    /// 工作主题名，Worker 据此回复，暂存对象的 bucket 也由它派生
    pub topic_hint: String,
    pub payload: serde_json::Value,
}

impl WorkerEnvelope {
    pub fn new(
        job_id: impl Into<String>,
        job_type: JobType,
        topic_hint: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            topic_hint: topic_hint.into(),
            payload,
        }
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// 超出总线大小限制时，在工作主题上发布的暂存对象指针
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedPointer {
    pub job_id: String,
    pub topic_hint: String,
    pub bucket: String,
    pub key: String,
}

/// 传输选择器的投递回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// 直接发布到消息总线
    Direct { bytes: usize },
    /// 写入对象存储后发布指针
    Staged {
        bucket: String,
        key: String,
        bytes: usize,
    },
}

impl Delivery {
    pub fn label(&self) -> &'static str {
        match self {
            Delivery::Direct { .. } => "direct",
            Delivery::Staged { .. } => "staged",
        }
    }

    pub fn is_staged(&self) -> bool {
        matches!(self, Delivery::Staged { .. })
    }
}
