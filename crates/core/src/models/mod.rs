pub mod envelope;
pub mod event;
pub mod job;
pub mod response;

pub use envelope::{Delivery, StagedPointer, WorkerEnvelope};
pub use event::ProducerEvent;
pub use job::{JobRequest, JobType};
pub use response::{WorkerResponse};
