//! Runtime errors.

/// Errors that stop message processing.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The host sent a method the protocol does not allow inbound.
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("failed to encode message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Raised by a plugin's own handler.
    #[error("handler failed: {0}")]
    Handler(String),
}

impl PluginError {
    /// Build a handler error from anything printable.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }
}

/// Error delivering a message to the host.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("host channel closed")]
    Closed,
}

/// Error persisting a property.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("property store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("property store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Error building the authenticated backend client.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid backend base URL: {0:?}")]
    InvalidBaseUrl(String),
    #[error("empty access token")]
    EmptyToken,
}
