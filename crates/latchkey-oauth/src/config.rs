use smol_str::SmolStr;
use url::Url;

use crate::error::ConfigError;

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPE: &str = "openid profile email";
/// Route the provider redirects back to after login.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
/// Route the guard sends unauthenticated visitors to.
pub const DEFAULT_LOGIN_PATH: &str = "/login";
/// Landing route when an authenticated user hits the login route.
pub const DEFAULT_POST_LOGIN_PATH: &str = "/dashboard";

/// Environment variable holding the OAuth client ID.
pub const ENV_CLIENT_ID: &str = "LATCHKEY_CLIENT_ID";
/// Environment variable holding the provider base URL.
pub const ENV_DOMAIN: &str = "LATCHKEY_DOMAIN";
/// Environment variable holding the application origin.
pub const ENV_ORIGIN: &str = "LATCHKEY_ORIGIN";
/// Environment variable holding the optional API audience.
pub const ENV_AUDIENCE: &str = "LATCHKEY_AUDIENCE";
/// Environment variable overriding [`DEFAULT_SCOPE`].
pub const ENV_SCOPE: &str = "LATCHKEY_SCOPE";

/// Identity provider and application settings for the PKCE flow.
///
/// `domain` is the provider base URL; the authorize, token and end-session
/// endpoints hang off it under `/oauth/v2/`. `origin` is where the
/// application itself is served: the callback URL and post-logout redirect
/// are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    client_id: SmolStr,
    domain: Url,
    origin: Url,
    audience: Option<SmolStr>,
    scope: SmolStr,
    callback_path: SmolStr,
    login_path: SmolStr,
    post_login_path: SmolStr,
}

impl AuthConfig {
    /// Create a configuration with default scope and route paths.
    ///
    /// Both URLs must be hierarchical (`https://...`, `http://...`).
    pub fn new(
        client_id: impl Into<SmolStr>,
        domain: Url,
        origin: Url,
    ) -> Result<Self, ConfigError> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_CLIENT_ID));
        }
        for url in [&domain, &origin] {
            if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::NotHierarchical(url.as_str().into()));
            }
        }
        Ok(Self {
            client_id,
            domain,
            origin,
            audience: None,
            scope: SmolStr::new_static(DEFAULT_SCOPE),
            callback_path: SmolStr::new_static(DEFAULT_CALLBACK_PATH),
            login_path: SmolStr::new_static(DEFAULT_LOGIN_PATH),
            post_login_path: SmolStr::new_static(DEFAULT_POST_LOGIN_PATH),
        })
    }

    /// Read the configuration from `LATCHKEY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let parse_url = |key: &'static str| -> Result<Url, ConfigError> {
            let raw = required(key)?;
            Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })
        };

        let mut config = Self::new(
            required(ENV_CLIENT_ID)?,
            parse_url(ENV_DOMAIN)?,
            parse_url(ENV_ORIGIN)?,
        )?;
        if let Some(audience) = lookup(ENV_AUDIENCE).filter(|v| !v.trim().is_empty()) {
            config = config.with_audience(audience);
        }
        if let Some(scope) = lookup(ENV_SCOPE).filter(|v| !v.trim().is_empty()) {
            config = config.with_scope(scope);
        }
        Ok(config)
    }

    /// Set the API audience.
    pub fn with_audience(mut self, audience: impl Into<SmolStr>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Override the requested scope (default: `openid profile email`).
    pub fn with_scope(mut self, scope: impl Into<SmolStr>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Override the callback route (default: `/callback`).
    pub fn with_callback_path(mut self, path: impl Into<SmolStr>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Override the login route (default: `/login`).
    pub fn with_login_path(mut self, path: impl Into<SmolStr>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Override where an already-signed-in visitor of the login route goes
    /// when no `redirect` was requested (default: `/dashboard`).
    pub fn with_post_login_path(mut self, path: impl Into<SmolStr>) -> Self {
        self.post_login_path = path.into();
        self
    }

    /// OAuth client ID sent on authorize and token requests.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Provider base URL.
    pub fn domain(&self) -> &Url {
        &self.domain
    }

    /// Application origin.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Accepted for parity with the provider's console settings. Not sent on
    /// any request.
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Space-separated scopes requested at authorize time.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Path of the callback route.
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Path of the login route.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Default landing path after login.
    pub fn post_login_path(&self) -> &str {
        &self.post_login_path
    }

    /// `{origin}/callback`
    pub fn redirect_uri(&self) -> Url {
        self.app_url(&self.callback_path)
    }

    /// Serialized origin without a trailing slash, as `window.location.origin`.
    pub fn post_logout_redirect_uri(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    /// `{domain}/oauth/v2/authorize`
    pub fn authorize_endpoint(&self) -> Url {
        self.provider_url(&["oauth", "v2", "authorize"])
    }

    /// `{domain}/oauth/v2/token`
    pub fn token_endpoint(&self) -> Url {
        self.provider_url(&["oauth", "v2", "token"])
    }

    /// `{domain}/oauth/v2/logout`
    pub fn end_session_endpoint(&self) -> Url {
        self.provider_url(&["oauth", "v2", "logout"])
    }

    /// Whether `url` addresses the callback route of this application.
    pub fn is_callback(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin() && url.path() == self.callback_path.as_str()
    }

    /// Resolve an in-app location (path, path+query, or absolute URL) against
    /// the origin. Anything landing on a different origin resolves to `/`.
    pub fn app_url(&self, location: &str) -> Url {
        let root = || {
            let mut root = self.origin.clone();
            root.set_path("/");
            root.set_query(None);
            root.set_fragment(None);
            root
        };
        match self.origin.join(location) {
            Ok(url) if url.origin() == self.origin.origin() => url,
            _ => root(),
        }
    }

    fn provider_url(&self, segments: &[&str]) -> Url {
        let mut url = self.domain.clone();
        url.set_query(None);
        url.set_fragment(None);
        // checked hierarchical in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
