use std::sync::Arc;

use chrono::Utc;
use latchkey_common::{HttpClient, Storage, StorageError};
use smol_str::SmolStr;
use tokio::sync::watch;
use tracing::Instrument;
use url::Url;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::pkce;
use crate::repository::SessionRepository;
use crate::request::{
    RequestError, RequestErrorKind, authorization_url, end_session_url, exchange_code,
};
use crate::state::{AuthState, Effect};
use crate::types::{AuthSession, CallbackParams, FlowState, UserClaims};

/// Drives the authorization-code flow and owns the session.
///
/// Operations never navigate; anything the host has to do is returned as an
/// [`Effect`]. Clones share storage, state and HTTP client.
pub struct AuthManager<C, S> {
    config: Arc<AuthConfig>,
    repository: Arc<SessionRepository<S>>,
    client: Arc<C>,
}

impl<C, S> Clone for AuthManager<C, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            repository: self.repository.clone(),
            client: self.client.clone(),
        }
    }
}

impl<C, S> AuthManager<C, S>
where
    S: Storage,
{
    /// Create a manager in the `Initializing` state. Call [`restore`](Self::restore) next.
    pub fn new(config: AuthConfig, store: S, client: C) -> Self {
        Self {
            config: Arc::new(config),
            repository: Arc::new(SessionRepository::new(store)),
            client: Arc::new(client),
        }
    }

    /// Settings the manager was built with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Shared session repository, for wrappers built outside the manager.
    pub fn repository(&self) -> &Arc<SessionRepository<S>> {
        &self.repository
    }

    /// HTTP client used for the token exchange.
    pub fn http_client(&self) -> &Arc<C> {
        &self.client
    }

    /// Current state snapshot.
    pub fn state(&self) -> AuthState {
        self.repository.current()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.repository.subscribe()
    }

    /// Stored access token. No expiry check.
    pub fn access_token(&self) -> Option<SmolStr> {
        self.repository.access_token().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read access token");
            None
        })
    }

    /// Whether `url` is this application's callback route.
    pub fn is_callback(&self, url: &Url) -> bool {
        self.config.is_callback(url)
    }

    /// Rebuild the in-memory state from storage.
    ///
    /// An absent, unreadable or expired session is purged and the state becomes
    /// `Unauthenticated`. Flow keys are left alone, and a callback in flight
    /// keeps its `CallbackProcessing` state. A store that no longer parses at
    /// all is emptied so later logins can write to it again.
    pub fn restore(&self) -> AuthState {
        let _span = tracing::info_span!("restore").entered();
        if self.repository.current() == AuthState::CallbackProcessing {
            tracing::debug!("callback in progress, leaving state to it");
            return AuthState::CallbackProcessing;
        }

        let session = self.repository.load_session().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored session is unreadable, discarding");
            None
        });
        let next = match session {
            Some(session) if session.is_active() => {
                tracing::debug!(expires_at = %session.expires_at, "restored session");
                AuthState::Authenticated { user: session.user }
            }
            session => {
                if session.is_some() {
                    tracing::info!("stored session has expired");
                }
                self.purge_session();
                AuthState::Unauthenticated
            }
        };

        self.repository.update_state(|current| {
            if *current == AuthState::CallbackProcessing || *current == next {
                return false;
            }
            *current = next;
            true
        });
        self.repository.current()
    }

    /// Start a login: persist a fresh flow and hand back the authorize redirect.
    ///
    /// A `returnTo` already pending (set by the login route) wins over
    /// `current_path`. Any earlier flow is overwritten.
    pub fn login(&self, current_path: &str) -> Result<Effect> {
        let _span = tracing::info_span!("login").entered();
        let return_to = match self.repository.pending_return_to()? {
            Some(pending) => pending,
            None => SmolStr::new(current_path),
        };

        let (code_challenge, code_verifier) = pkce::generate_pkce();
        let state_nonce = pkce::generate_state();
        let url = authorization_url(&self.config, &state_nonce, &code_challenge)?;

        self.repository
            .save_flow(&FlowState {
                code_verifier,
                state_nonce,
                return_to: return_to.clone(),
            })
            .inspect_err(|e| tracing::error!(error = %e, "failed to persist login flow"))?;

        tracing::info!(%return_to, "redirecting to authorization endpoint");
        Ok(Effect::Redirect(url))
    }

    /// Remember where to go once logged in, or go there now if already logged in.
    ///
    /// This is what a host does when the login route is entered with
    /// `?redirect=...`.
    pub fn enter_login_route(&self, redirect: Option<&str>) -> Result<Effect> {
        let redirect = redirect.filter(|r| !r.is_empty());
        if self.repository.current().is_authenticated() {
            let target = redirect.unwrap_or(self.config.post_login_path());
            return Ok(Effect::Redirect(self.config.app_url(target)));
        }
        if let Some(redirect) = redirect {
            self.repository.set_return_to(redirect)?;
        }
        Ok(Effect::None)
    }

    /// Parse the query of a full callback URL and complete the flow.
    pub async fn handle_callback_url(&self, url: &Url) -> Result<Effect>
    where
        C: HttpClient + Send + Sync,
    {
        let params = CallbackParams::from_url(url)?;
        self.handle_callback(params).await
    }

    /// Complete a login from the provider's callback parameters.
    ///
    /// A callback without `code` is ignored. `state` must equal the stored
    /// nonce; on mismatch nothing is changed and the pending flow survives.
    /// Once the code has been sent, the flow is cleared whatever the outcome.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<Effect>
    where
        C: HttpClient + Send + Sync,
    {
        self.callback_inner(params)
            .instrument(tracing::info_span!("callback"))
            .await
    }

    async fn callback_inner(&self, params: CallbackParams) -> Result<Effect>
    where
        C: HttpClient + Send + Sync,
    {
        let Some(code) = params.code else {
            match params.error {
                Some(error) => tracing::warn!(
                    %error,
                    description = params.error_description.as_deref().unwrap_or_default(),
                    "provider returned an error instead of a code"
                ),
                None => tracing::debug!("callback carries no code, ignoring"),
            }
            return Ok(Effect::None);
        };

        let Some(returned_state) = params.state else {
            tracing::error!("callback is missing the state parameter");
            return Err(AuthError::StateMismatch);
        };
        let Some(flow) = self.repository.load_flow()? else {
            tracing::error!("callback received without a pending login");
            return Err(AuthError::NoPendingFlow);
        };
        if returned_state != flow.state_nonce {
            tracing::error!("callback state does not match the pending login");
            return Err(AuthError::StateMismatch);
        }

        let prior = self.repository.current();
        self.repository.set_state(AuthState::CallbackProcessing);

        let tokens = match exchange_code(
            self.client.as_ref(),
            &self.config,
            &code,
            &flow.code_verifier,
        )
        .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(error = %e, status = ?e.status(), "token exchange failed");
                self.abandon_flow(prior);
                return Err(e.into());
            }
        };

        let user = match UserClaims::from_id_token(&tokens.id_token) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "could not decode id token claims");
                None
            }
        };
        let session = AuthSession::from_token_response(tokens, user, Utc::now());
        if !session.is_active() {
            tracing::error!(
                expires_at = %session.expires_at,
                "token response carries no usable access token"
            );
            self.abandon_flow(prior);
            return Err(RequestError::new(RequestErrorKind::InvalidTokenResponse, None)
                .with_url(self.config.token_endpoint().as_str())
                .into());
        }
        if let Err(e) = self.repository.save_session(&session) {
            tracing::error!(error = %e, "failed to persist session");
            self.abandon_flow(prior);
            return Err(e.into());
        }

        self.repository.set_state(AuthState::Authenticated {
            user: session.user,
        });
        self.clear_flow();

        let target = self.config.app_url(&flow.return_to);
        tracing::info!(
            expires_at = %session.expires_at,
            return_to = %target.path(),
            "login complete"
        );
        Ok(Effect::Redirect(target))
    }

    /// End the session locally and hand back the provider's end-session redirect.
    ///
    /// Never fails and can be repeated.
    pub fn logout(&self) -> Effect {
        let _span = tracing::info_span!("logout").entered();
        self.purge_session();
        self.repository.set_state(AuthState::Unauthenticated);

        let url = end_session_url(&self.config).unwrap_or_else(|e| {
            tracing::error!(error = %e, "could not encode logout parameters");
            self.config.end_session_endpoint()
        });
        Effect::Redirect(url)
    }

    /// Remove the session keys, emptying the store when it no longer parses.
    fn purge_session(&self) {
        match self.repository.clear_session() {
            Ok(()) => {}
            Err(e @ (StorageError::Serde(_) | StorageError::Other(_))) => {
                tracing::warn!(error = %e, "storage is unreadable, resetting it");
                if let Err(e) = self.repository.reset() {
                    tracing::error!(error = %e, "failed to reset storage");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to purge session"),
        }
    }

    fn abandon_flow(&self, prior: AuthState) {
        self.clear_flow();
        let fallback = if prior.is_authenticated() {
            prior
        } else {
            AuthState::Unauthenticated
        };
        self.repository.set_state(fallback);
    }

    fn clear_flow(&self) {
        if let Err(e) = self.repository.clear_flow() {
            tracing::warn!(error = %e, "failed to clear login flow");
        }
    }
}
