//! The single owner of everything the flow persists.
//!
//! Keys are the ones a browser build keeps in `localStorage`, so a host that
//! shares storage with an existing web deployment reads the same session.

use chrono::{DateTime, Utc};
use latchkey_common::{Storage, StorageError};
use smol_str::SmolStr;
use tokio::sync::watch;

use crate::state::AuthState;
use crate::types::{AuthSession, FlowState, UserClaims};

/// Storage keys, shared with browser builds of the same application.
pub mod keys {
    /// Bearer token for API calls.
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Raw ID token as received.
    pub const ID_TOKEN: &str = "id_token";
    /// Refresh token, stored but never used.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Access token expiry in epoch milliseconds.
    pub const EXPIRES_AT: &str = "expires_at";
    /// JSON-encoded user claims, or `null`.
    pub const USER: &str = "user";
    /// CSRF nonce of the pending login.
    pub const AUTH_STATE: &str = "auth_state";
    /// PKCE verifier of the pending login.
    pub const CODE_VERIFIER: &str = "code_verifier";
    /// Where to go once the pending login completes.
    pub const RETURN_TO: &str = "returnTo";

    /// Keys making up the long-lived session record.
    pub const SESSION: [&str; 5] = [ACCESS_TOKEN, ID_TOKEN, REFRESH_TOKEN, EXPIRES_AT, USER];
    /// Keys of the in-progress login flow.
    pub const FLOW: [&str; 3] = [AUTH_STATE, CODE_VERIFIER, RETURN_TO];
}

/// Session repository: persisted records plus the observable in-memory state.
pub struct SessionRepository<S> {
    store: S,
    state: watch::Sender<AuthState>,
}

impl<S: Storage> SessionRepository<S> {
    /// Wrap `store`; the state starts as `Initializing`.
    pub fn new(store: S) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        Self { store, state }
    }

    /// Backing store.
    pub fn storage(&self) -> &S {
        &self.store
    }

    /// Read the persisted session.
    ///
    /// Returns `Ok(None)` when there is no access token or no expiry. Missing
    /// ID/refresh tokens read as empty; an unreadable `user` entry reads as
    /// `None` rather than failing the whole record.
    pub fn load_session(&self) -> Result<Option<AuthSession>, StorageError> {
        let Some(access_token) = self.store.get(keys::ACCESS_TOKEN)? else {
            return Ok(None);
        };
        let Some(expires_at) = self.store.get(keys::EXPIRES_AT)? else {
            return Ok(None);
        };
        let expires_at = parse_millis(&expires_at)
            .ok_or_else(|| StorageError::malformed(keys::EXPIRES_AT, "not an epoch-millisecond timestamp"))?;

        let user = match self.store.get(keys::USER)? {
            Some(raw) => match serde_json::from_str::<Option<UserClaims>>(&raw) {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(error = %e, "stored user claims are unreadable, ignoring");
                    None
                }
            },
            None => None,
        };

        Ok(Some(AuthSession {
            access_token: access_token.into(),
            id_token: self.store.get(keys::ID_TOKEN)?.unwrap_or_default().into(),
            refresh_token: self.store.get(keys::REFRESH_TOKEN)?.unwrap_or_default().into(),
            expires_at,
            user,
        }))
    }

    /// Write every session key.
    pub fn save_session(&self, session: &AuthSession) -> Result<(), StorageError> {
        self.store.set(keys::ACCESS_TOKEN, &session.access_token)?;
        self.store.set(keys::ID_TOKEN, &session.id_token)?;
        self.store.set(keys::REFRESH_TOKEN, &session.refresh_token)?;
        self.store.set(
            keys::EXPIRES_AT,
            &session.expires_at.timestamp_millis().to_string(),
        )?;
        self.store
            .set(keys::USER, &serde_json::to_string(&session.user)?)?;
        Ok(())
    }

    /// Remove every session key. All keys are attempted; the first failure is returned.
    pub fn clear_session(&self) -> Result<(), StorageError> {
        self.remove_all(&keys::SESSION)
    }

    /// Empty the backing store, flow keys included.
    ///
    /// For a store whose contents can no longer be parsed, where key-by-key
    /// removal fails the same way reading did.
    pub fn reset(&self) -> Result<(), StorageError> {
        self.store.clear()
    }

    /// Current access token, without any expiry check.
    pub fn access_token(&self) -> Result<Option<SmolStr>, StorageError> {
        Ok(self
            .store
            .get(keys::ACCESS_TOKEN)?
            .filter(|t| !t.is_empty())
            .map(SmolStr::from))
    }

    /// Read the pending flow. Requires both nonce and verifier; `returnTo`
    /// defaults to `/`.
    pub fn load_flow(&self) -> Result<Option<FlowState>, StorageError> {
        let Some(state_nonce) = self.store.get(keys::AUTH_STATE)? else {
            return Ok(None);
        };
        let Some(code_verifier) = self.store.get(keys::CODE_VERIFIER)? else {
            return Ok(None);
        };
        let return_to = self
            .store
            .get(keys::RETURN_TO)?
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "/".to_owned());
        Ok(Some(FlowState {
            code_verifier: code_verifier.into(),
            state_nonce: state_nonce.into(),
            return_to: return_to.into(),
        }))
    }

    /// Persist a flow, replacing whatever flow was pending.
    pub fn save_flow(&self, flow: &FlowState) -> Result<(), StorageError> {
        self.store.set(keys::RETURN_TO, &flow.return_to)?;
        self.store.set(keys::CODE_VERIFIER, &flow.code_verifier)?;
        self.store.set(keys::AUTH_STATE, &flow.state_nonce)?;
        Ok(())
    }

    /// Remove every flow key.
    pub fn clear_flow(&self) -> Result<(), StorageError> {
        self.remove_all(&keys::FLOW)
    }

    /// Return location of a pending login, if any.
    pub fn pending_return_to(&self) -> Result<Option<SmolStr>, StorageError> {
        Ok(self
            .store
            .get(keys::RETURN_TO)?
            .filter(|r| !r.is_empty())
            .map(SmolStr::from))
    }

    /// Remember where to go after the next login.
    pub fn set_return_to(&self, location: &str) -> Result<(), StorageError> {
        self.store.set(keys::RETURN_TO, location)
    }

    /// Snapshot of the in-memory state.
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Live view of the state; receivers see every transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Replace the state, notifying receivers only on change.
    pub(crate) fn set_state(&self, state: AuthState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Apply `f` to the state; `f` reports whether it changed anything.
    pub(crate) fn update_state(&self, f: impl FnOnce(&mut AuthState) -> bool) -> bool {
        self.state.send_if_modified(f)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut first_err = None;
        for key in keys {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove storage key");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let millis = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))?;
    DateTime::from_timestamp_millis(millis)
}
