use url::Url;

use crate::types::UserClaims;

/// Where the authentication session currently stands.
///
/// Replaces the `isLoading`/`isAuthenticated` flag pair: "loading while
/// authenticated" cannot be expressed.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    /// Startup, before the persisted session has been looked at.
    #[default]
    Initializing,
    /// No active session.
    Unauthenticated,
    /// A code exchange is in flight.
    CallbackProcessing,
    /// A session is active.
    Authenticated {
        /// `None` when the ID token payload could not be decoded.
        user: Option<UserClaims>,
    },
}

impl AuthState {
    /// Whether a session is active.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    /// True while the state is not yet settled (startup or code exchange).
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Initializing | AuthState::CallbackProcessing)
    }

    /// Claims of the logged-in user, when known.
    pub fn user(&self) -> Option<&UserClaims> {
        match self {
            AuthState::Authenticated { user } => user.as_ref(),
            _ => None,
        }
    }
}

/// Navigation the host has to carry out after an operation.
///
/// The core never navigates by itself; a browser host assigns
/// `window.location`, a CLI prints or opens the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a redirect is only performed when the host follows it"]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Full-page navigation to the given URL.
    Redirect(Url),
}

impl Effect {
    /// Target of a redirect, if this is one.
    pub fn redirect_url(&self) -> Option<&Url> {
        match self {
            Effect::Redirect(url) => Some(url),
            Effect::None => None,
        }
    }
}
