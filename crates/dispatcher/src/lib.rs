//! Job dispatch core
//!
//! Hands jobs to an out-of-process worker pool over a message bus, correlates worker
//! responses back to the submitting producer and enforces a per-job deadline.

pub mod correlation;
pub mod dispatcher;
pub mod jobs;
pub mod response_router;
pub mod telemetry;
pub mod timeout_supervisor;
pub mod transport;

pub use correlation::{CorrelationTable, Resolution, Resolved};
pub use dispatcher::{Dispatcher, SubmitOutcome};
pub use jobs::{ImageProcessingJob, JobHandler, JobRegistry};
pub use response_router::{ResponseRouter, RouteOutcome};
pub use timeout_supervisor::TimeoutSupervisor;
pub use transport::{TransportKind, TransportSelector};
