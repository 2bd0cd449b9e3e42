pub mod blob_store;
pub mod message_bus;
pub mod producer;

pub use blob_store::BlobStore;
pub use message_bus::{Acker, InboundMessage, MessageBus, Subscription};
pub use producer::{ChannelProducer, ProducerChannel};
