use chrono::{DateTime, TimeDelta, Utc};
use smol_str::SmolStr;

use super::{OAuthTokenResponse, UserClaims};

/// The long-lived session record established by a completed callback.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    /// Bearer token for API calls.
    pub access_token: SmolStr,
    /// Raw ID token.
    pub id_token: SmolStr,
    /// Stored for later use; nothing refreshes with it yet.
    pub refresh_token: SmolStr,
    /// When the access token stops being usable.
    pub expires_at: DateTime<Utc>,
    /// Decoded ID token claims.
    pub user: Option<UserClaims>,
}

impl AuthSession {
    /// Build a session from a token response received at `now`.
    ///
    /// `expires_in` values that would overflow the calendar clamp to the
    /// latest representable instant.
    pub fn from_token_response(
        response: OAuthTokenResponse,
        user: Option<UserClaims>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = TimeDelta::try_seconds(response.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at,
            user,
        }
    }

    /// Active iff not yet expired and carrying a non-empty access token.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && !self.access_token.is_empty()
    }

    /// [`is_active_at`](Self::is_active_at) the current time.
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// State persisted across the round trip to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    /// PKCE verifier matching the challenge sent to the provider.
    pub code_verifier: SmolStr,
    /// CSRF nonce the callback must echo.
    pub state_nonce: SmolStr,
    /// In-app location to land on after login.
    pub return_to: SmolStr,
}
