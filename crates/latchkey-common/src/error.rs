use miette::Diagnostic;
use smol_str::SmolStr;
use std::error::Error as StdError;

/// Errors emitted by storage backends.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum StorageError {
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(latchkey::storage::io))]
    Io(#[from] std::io::Error),
    /// Serialization error (e.g., JSON)
    #[error("serialization error: {0}")]
    #[diagnostic(code(latchkey::storage::serde))]
    Serde(#[from] serde_json::Error),
    /// A stored value could not be interpreted
    #[error("malformed value for key `{key}`: {reason}")]
    #[diagnostic(
        code(latchkey::storage::malformed),
        help("the entry was likely written by another version or edited by hand; clearing it is safe")
    )]
    Malformed {
        /// Storage key holding the bad value
        key: SmolStr,
        /// What was wrong with it
        reason: SmolStr,
    },
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(latchkey::storage::other))]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl StorageError {
    /// Create a malformed-value error for `key`.
    pub fn malformed(key: impl Into<SmolStr>, reason: impl Into<SmolStr>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Transport-level errors raised by the bundled HTTP client.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TransportError {
    /// The underlying reqwest client failed
    #[cfg(feature = "reqwest-client")]
    #[error("HTTP transport error: {0}")]
    #[diagnostic(code(latchkey::transport::reqwest))]
    Reqwest(#[from] reqwest::Error),
    /// Request or response could not be assembled
    #[error("invalid HTTP message: {0}")]
    #[diagnostic(code(latchkey::transport::http))]
    Http(#[from] http::Error),
}
