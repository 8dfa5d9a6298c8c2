/// Error types for the simulator.
/// Stepping past the end of a run is never an error; everything here is a
/// rejected construction or a failed I/O operation around a run.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    /// Matrix dimension outside [1, MAX_SIZE]
    #[error("invalid matrix size {size}: must be between 1 and {max}")]
    InvalidSize { size: usize, max: usize },

    /// Random value range with min > max
    #[error("invalid value range [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },

    /// A dot product of this size and range could overflow i64
    #[error("values in [{min}, {max}] overflow i64 for size {size}")]
    ValueOverflow { size: usize, min: i64, max: i64 },

    /// Operands that cannot be multiplied together
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to publish metrics to {path}: {source}")]
    Metrics {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
