//! Transport and storage primitives shared by the latchkey crates.
//!
//! Nothing in here knows about OAuth. The protocol crate builds its session
//! repository on [`storage::Storage`] and talks to the identity provider
//! through [`http_client::HttpClient`], so hosts can swap either for their own
//! implementation (browser storage, a platform keychain, a recording mock).

#![warn(missing_docs)]
pub use smol_str;

/// Error types for storage and transport.
pub mod error;
/// HTTP client abstraction used by latchkey crates.
pub mod http_client;
/// Origin-scoped key/value storage.
pub mod storage;

pub use error::{StorageError, TransportError};
pub use http_client::HttpClient;
pub use storage::{FileStorage, MemoryStorage, Storage};
