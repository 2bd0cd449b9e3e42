pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use models::{
    Delivery, JobRequest, JobType, ProducerEvent, StagedPointer, WorkerEnvelope,
    WorkerResponse,
};
pub use traits::{
    Acker, BlobStore, ChannelProducer, InboundMessage, MessageBus, ProducerChannel, Subscription,
};
