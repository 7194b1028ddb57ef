//! Error types for hotprops.

/// Result type alias for hotprops operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Boxed error raised by listener code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when working with a property store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to load properties from a source.
    #[error("Failed to load properties: {0}")]
    LoadError(String),

    /// Failed to parse a property source.
    #[error("Failed to parse properties: {0}")]
    ParseError(String),

    /// Failed to deserialize properties into a typed value.
    #[error("Failed to deserialize properties: {0}")]
    DeserializationError(String),

    /// A printf-style template could not be formatted with the given arguments.
    #[error("Invalid format template: {0}")]
    FormatError(String),

    /// Hot reload could not be set up.
    #[error("Hot reload error: {0}")]
    WatchError(String),

    /// Attempted to use a feature that is not enabled.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),

    /// A listener failed with an error that is not a rollback signal.
    ///
    /// The failing operation applies none of its changes.
    #[error("Listener failed: {0}")]
    Listener(#[source] BoxError),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

/// Signals a listener can raise from a `before_*` callback.
///
/// The two rollback variants are control flow, not failures: the store
/// recovers from them internally and never returns them to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Veto exactly the change being announced.
    #[error("change rolled back by listener")]
    RollbackOperation,

    /// Veto every change of the enclosing operation.
    #[error("batch rolled back by listener")]
    RollbackBatch,

    /// Any other listener failure; propagated to the caller.
    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl ListenerError {
    /// Wrap an arbitrary error as a listener failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }

    /// Whether this is one of the two rollback signals.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::RollbackOperation | Self::RollbackBatch)
    }
}

impl From<ListenerError> for ConfigError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Failed(source) => ConfigError::Listener(source),
            rollback => ConfigError::Listener(Box::new(rollback)),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}
