//! Error types for RelayKit core.

/// Main error type for resilience operations.
///
/// All core operations return `Result<T> = std::result::Result<T, CoreError>`.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Circuit breaker is rejecting calls for the named dependency.
    #[error("Circuit open for dependency: {0}")]
    CircuitOpen(String),

    /// Operation failed after exhausting every retry attempt.
    #[error("Operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made (initial call plus retries)
        attempts: u32,
        /// The last error returned by the operation
        #[source]
        source: anyhow::Error,
    },

    /// Event bus queue has been closed.
    #[error("Event bus queue closed")]
    QueueClosed,
}

/// Type alias for Result with CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
