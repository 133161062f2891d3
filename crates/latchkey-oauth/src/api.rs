//! Typed calls to the application backend.
//!
//! The client is meant to sit on top of an [`AuthenticatedClient`] so every
//! call carries the session's bearer token.
//!
//! [`AuthenticatedClient`]: crate::fetch::AuthenticatedClient

use std::collections::BTreeMap;

use http::{Method, Request, StatusCode, header};
use latchkey_common::HttpClient;
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

use crate::request::BoxError;
use crate::types::decode_jwt_payload;

/// Backend base URL used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
/// Environment variable overriding [`DEFAULT_API_BASE_URL`].
pub const ENV_API_URL: &str = "LATCHKEY_API_URL";

/// Profile returned by `GET /user/profile`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    /// Account type reported by the backend.
    #[serde(rename = "accountType")]
    pub account_type: SmolStr,
    /// Any other profile fields.
    #[serde(flatten)]
    pub extra: BTreeMap<SmolStr, Value>,
}

/// Errors from backend API calls.
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    /// The backend answered 401.
    #[error("unauthorized")]
    #[diagnostic(
        code(latchkey_oauth::api::unauthorized),
        help("the session is missing or no longer accepted; log in again")
    )]
    Unauthorized,
    /// Any other non-success status.
    #[error("{context}: HTTP {status}")]
    #[diagnostic(code(latchkey_oauth::api::status))]
    Status {
        /// Status received.
        status: StatusCode,
        /// Which call failed.
        context: &'static str,
    },
    /// Transport failure.
    #[error("request failed")]
    #[diagnostic(code(latchkey_oauth::api::request))]
    Request(#[source] BoxError),
    /// Body did not decode.
    #[error("response is not the expected JSON: {0}")]
    #[diagnostic(code(latchkey_oauth::api::decode))]
    Decode(#[from] serde_json::Error),
}

impl From<http::Error> for ApiError {
    fn from(e: http::Error) -> Self {
        Self::Request(Box::new(e))
    }
}

/// Backend API client over any [`HttpClient`].
pub struct ApiClient<C> {
    client: C,
    base_url: Url,
}

impl<C> ApiClient<C> {
    /// Client for the default backend at `http://localhost:8000/api`.
    pub fn new(client: C) -> Self {
        let base_url = Url::parse(DEFAULT_API_BASE_URL).expect("default API base URL is valid");
        Self { client, base_url }
    }

    /// Point the client at another backend.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Backend base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl<C: HttpClient + Sync> ApiClient<C> {
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn get_user_profile(&self) -> Result<UserProfile, ApiError> {
        self.get_json(&["user", "profile"], "failed to fetch user profile")
            .await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn fetch_protected_resource(&self) -> Result<Value, ApiError> {
        self.get_json(&["protected-resource"], "failed to fetch protected resource")
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        context: &'static str,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        let req = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::ACCEPT, "application/json")
            .body(Vec::new())?;

        let res = self
            .client
            .send_http(req)
            .await
            .map_err(|e| ApiError::Request(Box::new(e)))?;

        match res.status() {
            status if status.is_success() => Ok(serde_json::from_slice(res.body())?),
            status if status == StatusCode::UNAUTHORIZED => {
                tracing::warn!(%url, "backend rejected the session");
                Err(ApiError::Unauthorized)
            }
            status => {
                tracing::warn!(%url, %status, "{context}");
                Err(ApiError::Status { status, context })
            }
        }
    }
}

/// Log what can be learned from an access token without verifying it.
///
/// Returns the decoded payload when the token is a JWT. Opaque tokens are
/// valid and simply yield `None`. The token itself is never logged.
pub fn inspect_access_token(token: Option<&str>) -> Option<Value> {
    let Some(token) = token else {
        tracing::debug!("no access token stored");
        return None;
    };
    let segments = token.split('.').count();
    tracing::debug!(segments, len = token.len(), "access token");
    if segments < 2 {
        return None;
    }
    match decode_jwt_payload::<Value>(token) {
        Ok(payload) => {
            tracing::debug!(%payload, "access token payload");
            Some(payload)
        }
        Err(e) => {
            tracing::debug!(error = %e, "access token payload is not decodable");
            None
        }
    }
}
