use thiserror::Error;

/// Storage backend failures. These never reach the engine's caller: lookup
/// and store paths degrade to pass-through (logged) when a backend raises.
/// Resolution failures are the exception — an unknown backend URI is a
/// construction-time error and fails fast.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown storage backend scheme in {uri:?}")]
    UnknownScheme { uri: String },

    #[error("invalid storage backend uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("remote cache failure: {0}")]
    Remote(String),

    #[error("content blob {digest} missing from content store")]
    MissingContent { digest: String },
}

/// Failures raised by the injected origin-fetch capability.
#[derive(Debug, Error)]
pub enum OriginError {
    /// The origin could not be reached, or the attempt was cancelled or
    /// timed out. Feeds the retry / fault-tolerance path.
    #[error("origin connection failed: {0}")]
    ConnectionFailed(String),

    /// The origin misbehaved in a way that is not a connectivity problem.
    #[error("origin error: {0}")]
    Other(String),
}

impl OriginError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, OriginError::ConnectionFailed(_))
    }
}

/// The only error the engine surfaces to its caller: a propagated origin
/// failure. Cache degradation is silent-but-logged by design.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Origin(#[from] OriginError),
}
