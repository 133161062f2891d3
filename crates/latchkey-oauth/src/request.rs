use http::{Method, Request, StatusCode, header};
use latchkey_common::http_client::HttpClient;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::config::AuthConfig;
use crate::types::{
    AuthorizationCodeChallengeMethod, AuthorizationResponseType, AuthorizeParameters,
    LogoutParameters, OAuthTokenResponse, TokenGrantType, TokenRequestParameters,
};

/// Boxed error source carried by [`RequestError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised while talking to the provider's token endpoint.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct RequestError {
    #[diagnostic_source]
    kind: RequestErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    url: Option<SmolStr>,
}

/// Error categories for token endpoint calls
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RequestErrorKind {
    /// Request could not be assembled
    #[error("http build error")]
    #[diagnostic(code(latchkey_oauth::request::http_build))]
    HttpBuild,

    /// Transport failed before a response arrived
    #[error("transport error")]
    #[diagnostic(
        code(latchkey_oauth::request::transport),
        help("check network connectivity and the configured provider domain")
    )]
    Transport,

    /// Non-success status without a JSON body
    #[error("http status: {0}")]
    #[diagnostic(
        code(latchkey_oauth::request::http_status),
        help("see server response for details")
    )]
    HttpStatus(StatusCode),

    /// Non-success status with an error body
    #[error("http status: {status}, body: {body:?}")]
    #[diagnostic(
        code(latchkey_oauth::request::http_status_body),
        help("server returned error JSON; inspect fields like `error`, `error_description`")
    )]
    HttpStatusWithBody {
        /// Status received.
        status: StatusCode,
        /// Decoded error body.
        body: Value,
    },

    /// Form serialization error
    #[error("form serialization error")]
    #[diagnostic(code(latchkey_oauth::request::serde_form))]
    SerdeHtmlForm,

    /// JSON error
    #[error("json error")]
    #[diagnostic(code(latchkey_oauth::request::serde_json))]
    SerdeJson,

    /// Token response parsed but grants no usable session
    #[error("invalid token response")]
    #[diagnostic(
        code(latchkey_oauth::request::invalid_token_response),
        help("the provider returned an empty access token or a non-positive `expires_in`")
    )]
    InvalidTokenResponse,
}

impl RequestError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: RequestErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            url: None,
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> &RequestErrorKind {
        &self.kind
    }

    /// Extra detail attached where the error was raised.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// URL of the request that failed, if known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// HTTP status returned by the provider, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            RequestErrorKind::HttpStatus(status)
            | RequestErrorKind::HttpStatusWithBody { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Attach a help message shown by miette.
    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach extra detail.
    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Record the URL of the failed request.
    pub fn with_url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Transport failure wrapping the client error.
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(RequestErrorKind::Transport, Some(Box::new(source)))
    }

    /// Non-success status without a usable body.
    pub fn http_status(status: StatusCode) -> Self {
        Self::new(RequestErrorKind::HttpStatus(status), None)
    }

    /// Non-success status with the JSON error body.
    pub fn http_status_with_body(status: StatusCode, body: Value) -> Self {
        Self::new(RequestErrorKind::HttpStatusWithBody { status, body }, None)
    }
}

impl From<http::Error> for RequestError {
    fn from(e: http::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::HttpBuild, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify the configured endpoints are valid URIs")
    }
}

impl From<serde_html_form::ser::Error> for RequestError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeHtmlForm, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check token request parameters are serializable")
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeJson, Some(Box::new(e)))
            .with_context(msg)
            .with_help("token response must carry `access_token` and `expires_in`")
    }
}

/// Result of a provider request.
pub type Result<T> = core::result::Result<T, RequestError>;

/// URL of the redirect that starts a login at the provider.
pub fn authorization_url(
    config: &AuthConfig,
    state: &str,
    code_challenge: &str,
) -> core::result::Result<Url, serde_html_form::ser::Error> {
    let redirect_uri = config.redirect_uri();
    let query = serde_html_form::to_string(AuthorizeParameters {
        client_id: config.client_id(),
        response_type: AuthorizationResponseType::Code,
        redirect_uri: redirect_uri.as_str(),
        scope: config.scope(),
        state,
        code_challenge,
        code_challenge_method: AuthorizationCodeChallengeMethod::S256,
    })?;
    let mut url = config.authorize_endpoint();
    url.set_query(Some(&query));
    Ok(url)
}

/// URL of the redirect to the provider's end-session endpoint.
pub fn end_session_url(
    config: &AuthConfig,
) -> core::result::Result<Url, serde_html_form::ser::Error> {
    let post_logout = config.post_logout_redirect_uri();
    let query = serde_html_form::to_string(LogoutParameters {
        client_id: config.client_id(),
        post_logout_redirect_uri: &post_logout,
    })?;
    let mut url = config.end_session_endpoint();
    url.set_query(Some(&query));
    Ok(url)
}

/// Exchange an authorization code for tokens. One attempt, no retry.
#[tracing::instrument(level = "debug", skip_all, fields(endpoint = %config.token_endpoint()))]
pub async fn exchange_code<T>(
    client: &T,
    config: &AuthConfig,
    code: &str,
    verifier: &str,
) -> Result<OAuthTokenResponse>
where
    T: HttpClient + Sync,
{
    let url = config.token_endpoint();
    let redirect_uri = config.redirect_uri();
    let body = serde_html_form::to_string(TokenRequestParameters {
        grant_type: TokenGrantType::AuthorizationCode,
        client_id: config.client_id(),
        code,
        redirect_uri: redirect_uri.as_str(),
        code_verifier: verifier,
    })?;
    let req = Request::builder()
        .uri(url.as_str())
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::ACCEPT, "application/json")
        .body(body.into_bytes())?;

    let res = client
        .send_http(req)
        .await
        .map_err(|e| RequestError::transport(e).with_url(url.as_str()))?;

    let status = res.status();
    if status.is_success() {
        Ok(serde_json::from_slice(res.body())?)
    } else if status.is_client_error() {
        // an unparsable error body still reports the status
        match serde_json::from_slice(res.body()) {
            Ok(body) => {
                Err(RequestError::http_status_with_body(status, body).with_url(url.as_str()))
            }
            Err(_) => Err(RequestError::http_status(status).with_url(url.as_str())),
        }
    } else {
        Err(RequestError::http_status(status).with_url(url.as_str()))
    }
}
