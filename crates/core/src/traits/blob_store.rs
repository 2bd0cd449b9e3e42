use async_trait::async_trait;

use crate::DispatchResult;

/// 对象存储抽象接口，仅用于超大负载的暂存
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> DispatchResult<()>;
}
