use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

/// Worker 回传的响应
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    Completed {
        job_id: String,
        result: serde_json::Value,
    },
    Failed {
        job_id: String,
        error: String,
    },
    Unrecognized {
        message_type: String,
        job_id: Option<String>,
    },
}

/// 总线上的原始JSON结构：`{"type": ..., "payload": {"id": ..., ...}}`
#[derive(Debug, Deserialize, Serialize)]
struct RawResponse {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    payload: RawPayload,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

impl WorkerResponse {
    pub const COMPLETED: &'static str = "COMPLETED";
    pub const FAILED: &'static str = "FAILED";

    pub fn completed(job_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self::Completed {
            job_id: job_id.into(),
            result,
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed {
            job_id: job_id.into(),
            error: error.into(),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            WorkerResponse::Completed { job_id, .. } | WorkerResponse::Failed { job_id, .. } => {
                Some(job_id)
            }
            WorkerResponse::Unrecognized { job_id, .. } => job_id.as_deref(),
        }
    }

    /// 解码总线消息。JSON 本身无法解析时返回协议错误；
    /// 种类未知或缺少 id 的消息解码为 `Unrecognized`。
    pub fn from_bytes(bytes: &[u8]) -> DispatchResult<Self> {
        let raw: RawResponse = serde_json::from_slice(bytes)
            .map_err(|e| DispatchError::Protocol(format!("响应不是合法JSON: {e}")))?;

        let RawResponse {
            message_type,
            payload,
        } = raw;

        let job_id = match payload.id {
            Some(id) => id,
            None => {
                return Ok(Self::Unrecognized {
                    message_type,
                    job_id: None,
                })
            }
        };

        Ok(match message_type.as_str() {
            Self::COMPLETED => Self::Completed {
                job_id,
                result: payload.result.unwrap_or(serde_json::Value::Null),
            },
            Self::FAILED => Self::Failed {
                job_id,
                error: match payload.error {
                    Some(serde_json::Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => "Worker未提供错误信息".to_string(),
                },
            },
            _ => Self::Unrecognized {
                message_type,
                job_id: Some(job_id),
            },
        })
    }

    /// 编码为总线消息，Worker 侧和测试使用
    pub fn to_bytes(&self) -> DispatchResult<Vec<u8>> {
        let raw = match self {
            WorkerResponse::Completed { job_id, result } => RawResponse {
                message_type: Self::COMPLETED.to_string(),
                payload: RawPayload {
                    id: Some(job_id.clone()),
                    result: Some(result.clone()),
                    error: None,
                },
            },
            WorkerResponse::Failed { job_id, error } => RawResponse {
                message_type: Self::FAILED.to_string(),
                payload: RawPayload {
                    id: Some(job_id.clone()),
                    result: None,
                    error: Some(serde_json::Value::String(error.clone())),
                },
            },
            WorkerResponse::Unrecognized {
                message_type,
                job_id,
            } => RawResponse {
                message_type: message_type.clone(),
                payload: RawPayload {
                    id: job_id.clone(),
                    result: None,
                    error: None,
                },
            },
        };
        Ok(serde_json::to_vec(&raw)?)
    }
}
