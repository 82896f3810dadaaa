use thiserror::Error;

/// Core error type for Waypoint operations.
#[derive(Error, Debug)]
pub enum WaypointError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed directory: {0}")]
    MalformedDirectory(String),

    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Agent stopped")]
    Shutdown,
}

impl WaypointError {
    /// Whether this error is the expected outcome of a long-poll with no changes.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportTimeout(_))
    }
}

impl From<serde_json::Error> for WaypointError {
    fn from(e: serde_json::Error) -> Self {
        WaypointError::Serialization(e.to_string())
    }
}

/// Result type alias using WaypointError.
pub type Result<T> = std::result::Result<T, WaypointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(WaypointError::TransportTimeout("watch".into()).is_timeout());
        assert!(!WaypointError::Transport("refused".into()).is_timeout());
        assert!(!WaypointError::MalformedDirectory("empty".into()).is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = WaypointError::MalformedDirectory("no nodes".into());
        assert_eq!(err.to_string(), "Malformed directory: no nodes");
    }
}
