mod registry;

pub use registry::{ConnectionRegistry, MembershipEvent};
