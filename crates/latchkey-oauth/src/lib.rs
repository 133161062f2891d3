//! OAuth2/OIDC authorization code flow with PKCE for public clients.
//!
//! [`AuthManager`](manager::AuthManager) runs the flow against Zitadel-style
//! `/oauth/v2/*` endpoints and keeps the resulting session in a
//! [`Storage`](latchkey_common::Storage). Navigation is left to the host:
//! operations return an [`Effect`](state::Effect) to carry out.

#![warn(missing_docs)]

/// Client for the protected backend API.
pub mod api;
/// Provider and application settings.
pub mod config;
/// Errors surfaced by the session manager.
pub mod error;
/// HTTP client wrapper that attaches the bearer token.
pub mod fetch;
/// Route protection.
pub mod guard;
/// The session manager.
pub mod manager;
/// PKCE verifier, challenge and nonce generation.
pub mod pkce;
/// Persisted session and flow records.
pub mod repository;
/// Provider requests and their errors.
pub mod request;
/// Observable authentication state.
pub mod state;
/// Wire and storage types.
pub mod types;

pub use api::{ApiClient, ApiError, UserProfile};
pub use config::AuthConfig;
pub use error::{AuthError, ConfigError};
pub use fetch::AuthenticatedClient;
pub use guard::{GuardDecision, RouteGuard};
pub use manager::AuthManager;
pub use request::{RequestError, RequestErrorKind};
pub use state::{AuthState, Effect};
