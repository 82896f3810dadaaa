mod ids;
mod traits;

pub use ids::{AgentId, JobId, Phase};
pub use traits::{
    BoxFuture, ConnectionSink, DirectoryRequest, DirectoryTransport, MembershipStore, Scheduler,
    WaitIndex,
};
