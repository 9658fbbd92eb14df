//! Pipeline orchestration for Quarry.
//!
//! This crate runs one orchestration cycle over the project catalog: it probes
//! the data stores, partitions repositories by backend, and drives the
//! collection, identity and enrichment phases as batches of per-backend
//! lanes. The actual collection and enrichment work is delegated to
//! collaborators behind the traits in [`services`].

pub mod bridge;
pub mod lane;
pub mod orchestrator;
pub mod partition;
pub mod services;
pub mod signal;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::CommandBridge;
pub use lane::{LaneReport, Runnable, TaskLane};
pub use orchestrator::{CycleReport, Orchestrator, PhaseReport};
pub use partition::Partition;
pub use services::{
    CollectionService, EnrichRequest, EnrichmentService, FetchRequest, IdentityLoadRequest,
    IdentityService, IdentityUnifyRequest, Services,
};
pub use signal::StopSignal;
pub use task::{Task, TaskContext, TaskKind, TaskOutcome};
