use thiserror::Error;

/// 分发器错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("任务参数校验失败: {0}")]
    Validation(String),

    #[error("不允许的任务类型: {job_type}")]
    NotPermitted { job_type: String },

    #[error("消息总线错误: {0}")]
    MessageBus(String),

    #[error("对象存储错误: {0}")]
    BlobStore(String),

    #[error("任务 {id} 执行超时 (源: {source_ref})")]
    Timeout { id: String, source_ref: String },

    #[error("任务负载准备失败: {0}")]
    Preparation(String),

    #[error("任务结果落地失败: {0}")]
    Finalization(String),

    #[error("无法识别的Worker响应: {0}")]
    Protocol(String),

    #[error("任务 {id} 已在分发中")]
    DuplicateJob { id: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::Preparation(message.into())
    }

    pub fn message_bus(message: impl Into<String>) -> Self {
        Self::MessageBus(message.into())
    }

    pub fn blob_store(message: impl Into<String>) -> Self {
        Self::BlobStore(message.into())
    }

    /// 消息总线或对象存储的失败，统称为传输错误
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::MessageBus(_) | Self::BlobStore(_))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
