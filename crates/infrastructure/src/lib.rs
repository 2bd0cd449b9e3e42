pub mod blob_store;
pub mod factory;
pub mod in_memory_bus;
pub mod rabbitmq_bus;

pub use blob_store::{FsBlobStore, InMemoryBlobStore, S3BlobStore};
pub use factory::{create_blob_store, create_message_bus, BlobStoreFactory, MessageBusFactory};
pub use in_memory_bus::{InMemoryMessageBus, TopicStats};
pub use rabbitmq_bus::RabbitMqMessageBus;
