//! Runtime pieces of the Waypoint discovery agent.
//!
//! The agent itself plus the concrete collaborators it runs against in a
//! real process: a tokio scheduler, in-memory and PostgreSQL stores, an
//! HTTP directory client and a connection registry.

pub mod agent;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod transport;

pub use agent::{is_watch_stale, AgentContext, DiscoveryAgent, GetOutcome, WatchOutcome};
pub use scheduler::TokioScheduler;
pub use sink::{ConnectionRegistry, MembershipEvent};
pub use store::{InMemoryStore, PgMembershipStore};
pub use transport::HttpDirectoryTransport;
