use std::sync::Arc;

use http::{HeaderValue, header::AUTHORIZATION};
use latchkey_common::{HttpClient, Storage};

use crate::manager::AuthManager;
use crate::repository::SessionRepository;

/// [`HttpClient`] decorator adding the stored bearer token to every request.
///
/// Without a token the request goes out unchanged, with no `Authorization`
/// header at all. Responses are passed through untouched; a 401 is for the
/// caller to interpret.
pub struct AuthenticatedClient<C, S> {
    inner: C,
    repository: Arc<SessionRepository<S>>,
}

impl<C: Clone, S> Clone for AuthenticatedClient<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl<C, S: Storage> AuthenticatedClient<C, S> {
    /// Wrap `inner`, reading tokens from `repository`.
    pub fn new(inner: C, repository: Arc<SessionRepository<S>>) -> Self {
        Self { inner, repository }
    }

    /// Wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn bearer(&self) -> Option<HeaderValue> {
        let token = match self.repository.access_token() {
            Ok(token) => token?,
            Err(e) => {
                tracing::warn!(error = %e, "could not read access token, sending request without it");
                return None;
            }
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(_) => {
                tracing::warn!("stored access token is not a valid header value, omitting it");
                None
            }
        }
    }
}

impl<C, S> HttpClient for AuthenticatedClient<C, S>
where
    C: HttpClient + Sync,
    S: Storage,
{
    type Error = C::Error;

    async fn send_http(
        &self,
        mut request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        if let Some(value) = self.bearer() {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        self.inner.send_http(request).await
    }
}

impl<C, S: Storage> AuthManager<C, S> {
    /// A request wrapper sharing this manager's HTTP client and session.
    pub fn authenticated_client(&self) -> AuthenticatedClient<Arc<C>, S> {
        AuthenticatedClient::new(self.http_client().clone(), self.repository().clone())
    }
}
