//! # Latchkey
//!
//! OAuth2/OIDC authorization code flow with PKCE, run from the client side the
//! way a single-page application does it: the session lives in a key/value
//! store the host controls, and every navigation is handed back to the host
//! instead of being performed.
//!
//! ## Example
//!
//! Start a login, then complete it from the URL the provider redirected to.
//!
//! ```no_run
//! use latchkey::{AuthConfig, AuthManager, Effect, MemoryStorage};
//! use miette::IntoDiagnostic;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let manager = AuthManager::new(config, MemoryStorage::new(), reqwest::Client::new());
//!     manager.restore();
//!
//!     if let Effect::Redirect(url) = manager.login("/profile")? {
//!         println!("open {url} and paste the URL you land on");
//!     }
//!
//!     let mut line = String::new();
//!     std::io::stdin().read_line(&mut line).into_diagnostic()?;
//!     let callback = url::Url::parse(line.trim()).into_diagnostic()?;
//!
//!     if let Effect::Redirect(url) = manager.handle_callback_url(&callback).await? {
//!         println!("logged in, continue at {url}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - [`common`]: the `HttpClient` and `Storage` seams with their default
//!   implementations.
//! - [`oauth`]: PKCE, the session manager, route guard, request wrapper and
//!   backend API client.

#![warn(missing_docs)]

/// Transport and storage primitives
pub use latchkey_common as common;
/// Authorization code flow and session management
pub use latchkey_oauth as oauth;

pub use latchkey_common::{
    FileStorage, HttpClient, MemoryStorage, Storage, StorageError, TransportError,
};
pub use latchkey_oauth::{
    ApiClient, ApiError, AuthConfig, AuthError, AuthManager, AuthState, AuthenticatedClient,
    ConfigError, Effect, GuardDecision, RequestError, RouteGuard, UserProfile,
};
pub use latchkey_oauth::types::{AuthSession, CallbackParams, UserClaims};
