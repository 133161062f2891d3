use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// `response_type` of the authorize request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationResponseType {
    /// Authorization code flow.
    Code,
}

/// `code_challenge_method` of the authorize request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationCodeChallengeMethod {
    /// SHA-256 challenge.
    S256,
}

/// `grant_type` of the token request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrantType {
    /// Exchange of an authorization code.
    AuthorizationCode,
}

/// Query of the redirect to the authorize endpoint.
#[derive(Serialize, Debug)]
pub struct AuthorizeParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.1
    /// OAuth client ID.
    pub client_id: &'a str,
    /// Always `code`.
    pub response_type: AuthorizationResponseType,
    /// Callback URL of this application.
    pub redirect_uri: &'a str,
    /// Space-separated scopes.
    pub scope: &'a str,
    /// CSRF nonce echoed back on the callback.
    pub state: &'a str,
    // https://datatracker.ietf.org/doc/html/rfc7636#section-4.3
    /// S256 challenge derived from the verifier.
    pub code_challenge: &'a str,
    /// Always `S256`.
    pub code_challenge_method: AuthorizationCodeChallengeMethod,
}

/// Form body of the authorization-code exchange.
#[derive(Serialize, Debug)]
pub struct TokenRequestParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.3
    /// Always `authorization_code`.
    pub grant_type: TokenGrantType,
    /// OAuth client ID.
    pub client_id: &'a str,
    /// Code received on the callback.
    pub code: &'a str,
    /// Same redirect URI the authorize request used.
    pub redirect_uri: &'a str,
    // https://datatracker.ietf.org/doc/html/rfc7636#section-4.5
    /// PKCE verifier the challenge was derived from.
    pub code_verifier: &'a str,
}

/// Query of the redirect to the end-session endpoint.
#[derive(Serialize, Debug)]
pub struct LogoutParameters<'a> {
    /// OAuth client ID.
    pub client_id: &'a str,
    /// Where the provider sends the browser after logout.
    pub post_logout_redirect_uri: &'a str,
}

/// Query parameters the provider appends to the callback URL.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code, absent on error callbacks.
    pub code: Option<SmolStr>,
    /// Echoed CSRF nonce.
    pub state: Option<SmolStr>,
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1
    /// Provider error code.
    pub error: Option<SmolStr>,
    /// Human-readable provider error.
    pub error_description: Option<SmolStr>,
}

impl CallbackParams {
    /// Parse a raw query string (without the leading `?`). Unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self, serde_html_form::de::Error> {
        serde_html_form::from_str(query)
    }

    /// Parse the query of a full callback URL.
    pub fn from_url(url: &url::Url) -> Result<Self, serde_html_form::de::Error> {
        Self::from_query(url.query().unwrap_or_default())
    }
}
