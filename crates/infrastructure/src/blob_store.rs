//! 对象存储实现：内存、本地文件系统与 S3

use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use jobrelay_core::{BlobStore, DispatchError, DispatchResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 内存对象存储，主要用于测试与单进程部署
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> DispatchResult<()> {
        debug!("写入内存对象 {}/{} ({} 字节)", bucket, key, data.len());
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }
}

/// 本地文件系统对象存储，对象保存为 `root/bucket/key`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// bucket 与 key 都只允许单个普通路径分量
    pub fn object_path(&self, bucket: &str, key: &str) -> DispatchResult<PathBuf> {
        for part in [bucket, key] {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => {}
                _ => {
                    return Err(DispatchError::blob_store(format!(
                        "非法的对象路径分量: {part:?}"
                    )))
                }
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> DispatchResult<()> {
        let path = self.object_path(bucket, key)?;
        let dir = self.root.join(bucket);

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            DispatchError::blob_store(format!("创建目录 {} 失败: {e}", dir.display()))
        })?;
        tokio::fs::write(&path, &data).await.map_err(|e| {
            DispatchError::blob_store(format!("写入对象 {} 失败: {e}", path.display()))
        })?;

        debug!("对象已写入 {} ({} 字节)", path.display(), data.len());
        Ok(())
    }
}

/// S3 对象存储
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 从标准 AWS 配置链（环境变量、profile、IMDS）创建，可覆盖区域
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        info!("S3 对象存储已初始化，区域: {:?}", config.region());
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> DispatchResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| DispatchError::blob_store(format!("写入 S3 对象 {bucket}/{key} 失败: {e}")))?;

        debug!("S3 对象已写入 {}/{} ({} 字节)", bucket, key, size);
        Ok(())
    }
}
