mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgMembershipStore;

/// The two per-service locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKind {
    Fetch,
    Watch,
}

impl LockKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Watch => "watch",
        }
    }
}
