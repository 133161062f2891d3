use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::config::{AuthConfig, DEFAULT_LOGIN_PATH};
use crate::state::AuthState;

/// Outcome of evaluating the guard for a protected location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the protected view.
    Allow,
    /// In-app location to navigate to instead, e.g. `/login?redirect=%2Fprofile`.
    Redirect(String),
}

#[derive(Serialize, Deserialize)]
struct LoginQuery<T> {
    redirect: T,
}

/// Gate in front of protected views. Reads state, never changes it.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: SmolStr,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            login_path: SmolStr::new_static(DEFAULT_LOGIN_PATH),
        }
    }
}

impl RouteGuard {
    /// Guard redirecting to the configured login path.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            login_path: config.login_path().into(),
        }
    }

    /// Allow when authenticated; otherwise send the user to the login route,
    /// carrying `location` so the login can come back to it.
    pub fn check(&self, state: &AuthState, location: &str) -> GuardDecision {
        if state.is_authenticated() {
            return GuardDecision::Allow;
        }
        match serde_html_form::to_string(LoginQuery { redirect: location }) {
            Ok(query) => GuardDecision::Redirect(format!("{}?{query}", self.login_path)),
            Err(e) => {
                tracing::warn!(error = %e, "could not encode redirect parameter");
                GuardDecision::Redirect(self.login_path.to_string())
            }
        }
    }
}

/// The `redirect` parameter of a login-route query string (leading `?` optional).
pub fn redirect_param(query: &str) -> Option<SmolStr> {
    let query = query.strip_prefix('?').unwrap_or(query);
    serde_html_form::from_str::<LoginQuery<Option<SmolStr>>>(query)
        .ok()
        .and_then(|q| q.redirect)
        .filter(|r| !r.is_empty())
}
