//! 任务类型注册表
//!
//! 每种任务类型由一个 [`JobHandler`] 提供校验、负载准备与结果落地逻辑。
//! 注册表在提交时按 `jobTypeName` 查找一次，未知名称或未注册的类型统一返回
//! `NotPermitted`。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobrelay_core::{DispatchError, DispatchResult, JobRequest, JobType};

pub mod image_processing;

pub use image_processing::ImageProcessingJob;

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// 同步校验，失败时不得产生任何副作用
    fn validate(&self, request: &JobRequest) -> DispatchResult<()>;

    /// 读取本地输入，生成发送给 Worker 的负载
    async fn prepare(&self, request: &JobRequest) -> DispatchResult<serde_json::Value>;

    /// Worker 成功返回后的本地落地，返回值即上报给生产者的结果
    async fn finalize(
        &self,
        request: &JobRequest,
        result: serde_json::Value,
    ) -> DispatchResult<serde_json::Value>;

    /// 超时等诊断信息中引用的源数据
    fn source_reference(&self, request: &JobRequest) -> String {
        request.inputs.join(",")
    }
}

#[derive(Default, Clone)]
pub struct JobRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册所有内置任务类型
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImageProcessingJob::new()));
        registry
    }

    /// 注册处理器，同类型已存在时替换并返回旧处理器
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(handler.job_type(), handler)
    }

    pub fn resolve(&self, job_type_name: &str) -> DispatchResult<Arc<dyn JobHandler>> {
        let job_type: JobType = job_type_name.parse()?;
        self.handlers
            .get(&job_type)
            .cloned()
            .ok_or_else(|| DispatchError::NotPermitted {
                job_type: job_type_name.to_string(),
            })
    }

    pub fn job_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
