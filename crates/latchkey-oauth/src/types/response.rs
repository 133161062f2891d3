use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Successful token endpoint response.
// https://datatracker.ietf.org/doc/html/rfc6749#section-5.1
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenResponse {
    /// Bearer token for API calls.
    pub access_token: SmolStr,
    /// OIDC ID token; empty when the provider sent none.
    #[serde(default)]
    pub id_token: SmolStr,
    /// Refresh token; empty when the provider sent none.
    #[serde(default)]
    pub refresh_token: SmolStr,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<SmolStr>,
    /// Granted scopes, when they differ from the requested ones.
    #[serde(default)]
    pub scope: Option<SmolStr>,
}
