//! Test doubles for the agent's collaborators.
//!
//! - [`MockDirectory`] stands in for the directory service and records requests.
//! - [`RecordingSink`] records membership notifications.
//! - [`fixtures`] builds endpoints and directory documents.
//! - [`TestDatabase`] provisions throwaway PostgreSQL databases for store tests.
//!
//! # Example
//!
//! ```ignore
//! let directory = MockDirectory::new();
//! directory.on_fetch("*/orders", MockReply::Snapshot(directory_snapshot("orders", &endpoints)));
//!
//! let sink = RecordingSink::new();
//! // ... build an agent around them ...
//! assert_eq!(sink.populated().len(), 1);
//! ```

pub mod db;
pub mod fixtures;
pub mod mock_directory;
pub mod recording_sink;

pub use db::{IsolatedTestDb, TestDatabase};
pub use fixtures::{directory_snapshot, endpoint};
pub use mock_directory::{MockDirectory, MockReply};
pub use recording_sink::{RecordingSink, SinkCall};

/// Assert that a result is an error of a specific variant.
///
/// ```ignore
/// assert_err_variant!(agent.get().await, WaypointError::MalformedDirectory(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}
