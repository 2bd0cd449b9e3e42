use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

/// 上游生产者提交的任务请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// 生产者分配的唯一标识，同时作为关联键
    pub id: String,
    #[serde(alias = "jobType")]
    pub job_type_name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl JobRequest {
    pub fn new(id: impl Into<String>, job_type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type_name: job_type_name.into(),
            inputs: Vec::new(),
            output_directory: None,
            args: serde_json::Value::Null,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 已知的任务类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    ImageProcessing,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageProcessing => "IMAGE_PROCESSING",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMAGE_PROCESSING" => Ok(JobType::ImageProcessing),
            other => Err(DispatchError::NotPermitted {
                job_type: other.to_string(),
            }),
        }
    }
}
