//! Error taxonomy for operation submission and lookup.

/// Errors returned by the submission gateway.
///
/// Display strings double as the `error` field of HTTP error bodies.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The request carried an empty operation id.
    #[error("Provide an id in request parameters")]
    MissingId,
    /// The request body is present but is not JSON.
    #[error("Request body is not valid JSON")]
    InvalidPayload,
    /// A status record already exists for this id.
    #[error("Operation with this ID already exists")]
    DuplicateOperation { id: String },
    /// The admission cap is reached.
    #[error("Too many requests")]
    Overloaded,
    /// A sync submission's wait budget ran out. The operation keeps running.
    #[error("Operation timed out")]
    Timeout { id: String, waited_ms: u64 },
    /// The executor reported failure for a sync operation.
    #[error("Operation failed")]
    ExecutionFailed { id: String },
    /// The gateway is draining for shutdown and takes no new operations.
    #[error("Server is shutting down")]
    ShuttingDown,
    /// The shared store could not complete a request.
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl OperationError {
    /// Short machine-readable label, used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::InvalidPayload => "invalid_payload",
            Self::DuplicateOperation { .. } => "duplicate",
            Self::Overloaded => "overloaded",
            Self::Timeout { .. } => "timeout",
            Self::ExecutionFailed { .. } => "failed",
            Self::ShuttingDown => "shutting_down",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
