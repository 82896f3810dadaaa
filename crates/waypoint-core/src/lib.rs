//! Core types for the Waypoint service-discovery agent.
//!
//! Holds the membership model, directory snapshot parsing, the traits the
//! agent's collaborators implement, configuration and the error type.

pub mod agent;
pub mod config;
pub mod error;
pub mod membership;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{
    AgentId, BoxFuture, ConnectionSink, DirectoryRequest, DirectoryTransport, JobId,
    MembershipStore, Phase, Scheduler, WaitIndex,
};
pub use config::WaypointConfig;
pub use error::{Result, WaypointError};
pub use membership::{
    parse_snapshot, Endpoint, MembershipDiff, MembershipSet, RawSnapshot, ServiceName,
};
