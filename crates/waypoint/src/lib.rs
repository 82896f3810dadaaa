//! Waypoint - service discovery agent
//!
//! Keeps a live, shared view of the endpoints registered for a set of
//! services in an etcd v2 style directory, and hands membership changes to
//! a connection registry.

mod runtime;

pub use waypoint_core;
pub use waypoint_runtime;

// Testing macros live at the waypoint_core crate root.
#[cfg(feature = "testing")]
pub use waypoint_core::assert_err_variant;

pub use runtime::prelude;
pub use runtime::{Waypoint, WaypointBuilder};
