mod diff;
mod endpoint;
mod snapshot;

pub use diff::MembershipDiff;
pub use endpoint::{Endpoint, MembershipSet, ServiceName};
pub use snapshot::{parse_snapshot, RawSnapshot};
