use std::sync::Arc;
use tracing::{debug, info};

use jobrelay_core::config::{BlobStoreConfig, BlobStoreType, MessageBusConfig, MessageBusType};
use jobrelay_core::{BlobStore, DispatchError, DispatchResult, MessageBus};

use crate::{FsBlobStore, InMemoryBlobStore, InMemoryMessageBus, RabbitMqMessageBus, S3BlobStore};

pub struct MessageBusFactory;

impl MessageBusFactory {
    pub async fn create(config: &MessageBusConfig) -> DispatchResult<Arc<dyn MessageBus>> {
        debug!("Creating message bus with type: {:?}", config.r#type);

        match config.r#type {
            MessageBusType::InMemory => {
                info!("使用内存消息总线");
                Ok(Arc::new(InMemoryMessageBus::new()))
            }
            MessageBusType::Rabbitmq => {
                info!("初始化RabbitMQ消息总线");
                let bus = RabbitMqMessageBus::new(&config.url).await?;
                Ok(Arc::new(bus))
            }
        }
    }
}

pub struct BlobStoreFactory;

impl BlobStoreFactory {
    pub async fn create(config: &BlobStoreConfig) -> DispatchResult<Arc<dyn BlobStore>> {
        debug!("Creating blob store with type: {:?}", config.r#type);

        match config.r#type {
            BlobStoreType::InMemory => {
                info!("使用内存对象存储");
                Ok(Arc::new(InMemoryBlobStore::new()))
            }
            BlobStoreType::Filesystem => {
                let root = config.root_dir.as_deref().ok_or_else(|| {
                    DispatchError::Configuration("文件系统对象存储需要配置 root_dir".to_string())
                })?;
                info!("使用文件系统对象存储: {}", root);
                Ok(Arc::new(FsBlobStore::new(root)))
            }
            BlobStoreType::S3 => Ok(Arc::new(S3BlobStore::from_env(config.region.clone()).await)),
        }
    }
}

pub async fn create_message_bus(config: &MessageBusConfig) -> DispatchResult<Arc<dyn MessageBus>> {
    MessageBusFactory::create(config).await
}

pub async fn create_blob_store(config: &BlobStoreConfig) -> DispatchResult<Arc<dyn BlobStore>> {
    BlobStoreFactory::create(config).await
}
