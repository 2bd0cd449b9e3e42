use serde::{Deserialize, Serialize};

/// Blob store type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobStoreType {
    #[default]
    InMemory,
    Filesystem,
    S3,
}

/// Blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    #[serde(rename = "type")]
    pub r#type: BlobStoreType,
    /// 文件系统存储的根目录
    pub root_dir: Option<String>,
    /// 暂存 bucket 前缀，完整名称为 `{prefix}-{work_topic}`
    pub bucket_prefix: String,
    pub region: Option<String>,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            r#type: BlobStoreType::InMemory,
            root_dir: None,
            bucket_prefix: "event-processing".to_string(),
            region: None,
        }
    }
}

impl BlobStoreConfig {
    /// Validate blob store configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket_prefix.is_empty() {
            return Err(anyhow::anyhow!("bucket前缀不能为空"));
        }

        if self.r#type == BlobStoreType::Filesystem
            && self.root_dir.as_deref().map_or(true, str::is_empty)
        {
            return Err(anyhow::anyhow!("文件系统对象存储必须配置root_dir"));
        }

        Ok(())
    }

    /// 根据工作主题派生暂存 bucket 名
    pub fn bucket_for_topic(&self, work_topic: &str) -> String {
        format!("{}-{}", self.bucket_prefix, work_topic)
    }
}
