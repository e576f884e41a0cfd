use thiserror::Error;

/// Unified error types for the killfeed engine
#[derive(Error, Debug)]
pub enum KillfeedError {
    #[error("I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Invalid sample: {reason}")]
    InvalidSample { reason: String },
}

/// Engine 의 one-deep undo 가 적용될 수 없는 경우
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollbackError {
    #[error("no undo record available (reset or already rolled back)")]
    NoUndoRecord,

    #[error("undo record targets kill #{recorded}, requested kill #{requested}")]
    StaleTarget { recorded: u64, requested: u64 },
}

/// Result type alias for engine operations
pub type KillfeedResult<T> = Result<T, KillfeedError>;

/// Helper functions for common error scenarios
impl KillfeedError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_sample(reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            reason: reason.into(),
        }
    }
}
