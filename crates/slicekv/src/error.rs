//! Error types for slicekv.

/// Error type for KV cache operations.
///
/// Every variant is raised before the cache is mutated, so a failed call
/// leaves buffers and occupancies exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KVError {
    /// Missing or malformed arguments: empty positions, a non-contiguous or
    /// length-mismatched position range, an out-of-range layer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The write would end past the pre-declared capacity. The generation
    /// session cannot continue with this cache.
    #[error("KV cache capacity exceeded: write ends at {end} > capacity {capacity}")]
    CapacityExceeded { end: usize, capacity: usize },

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },
}

impl KVError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        KVError::InvalidArgument(msg.into())
    }
}

pub type KVResult<T> = Result<T, KVError>;

/// Errors raised while loading a model config or planning a cache from it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
