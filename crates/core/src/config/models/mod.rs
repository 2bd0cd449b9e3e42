pub mod app_config;
pub mod blob_store;
pub mod dispatcher;
pub mod message_bus;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use blob_store::{BlobStoreConfig, BlobStoreType};
pub use dispatcher::{
    DispatcherConfig, DEFAULT_JOB_TIMEOUT_MS, DEFAULT_MAX_DIRECT_PAYLOAD_BYTES,
};
pub use message_bus::{MessageBusConfig, MessageBusType};
pub use observability::ObservabilityConfig;
