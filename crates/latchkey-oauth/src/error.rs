use latchkey_common::StorageError;
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::request::RequestError;

/// Errors emitted by the session manager.
///
/// None of these leave the session half-established: the worst outcome of any
/// of them is that the user is not logged in.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthError {
    /// `state` returned by the provider does not match the pending flow
    #[error("callback `state` does not match the pending login")]
    #[diagnostic(
        code(latchkey_oauth::state_mismatch),
        help("the callback was not initiated by this client or the login was restarted; start a new login")
    )]
    StateMismatch,
    /// A callback arrived but no flow was persisted
    #[error("no pending login flow")]
    #[diagnostic(
        code(latchkey_oauth::no_pending_flow),
        help("the code verifier is missing from storage; start a new login")
    )]
    NoPendingFlow,
    /// Token endpoint rejected the code or could not be reached
    #[error("token exchange failed")]
    #[diagnostic(code(latchkey_oauth::token_exchange))]
    TokenExchange(
        #[from]
        #[diagnostic_source]
        RequestError,
    ),
    /// Session storage failure
    #[error(transparent)]
    #[diagnostic(code(latchkey_oauth::storage))]
    Storage(#[from] StorageError),
    /// Callback query string could not be parsed
    #[error("malformed callback query: {0}")]
    #[diagnostic(code(latchkey_oauth::callback_query))]
    Callback(#[from] serde_html_form::de::Error),
    /// Query string could not be encoded
    #[error(transparent)]
    #[diagnostic(code(latchkey_oauth::form))]
    Form(#[from] serde_html_form::ser::Error),
}

impl AuthError {
    /// The request error behind a failed token exchange, if that is what this is.
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            AuthError::TokenExchange(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid or missing configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing configuration value `{0}`")]
    #[diagnostic(
        code(latchkey_oauth::config::missing),
        help("set the variable in the environment or pass the value explicitly")
    )]
    Missing(&'static str),
    /// A URL setting does not parse.
    #[error("`{key}` is not a valid URL: {source}")]
    #[diagnostic(code(latchkey_oauth::config::url))]
    InvalidUrl {
        /// Name of the setting.
        key: &'static str,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// A URL setting has no host to hang paths off.
    #[error("`{0}` must be an http(s) URL")]
    #[diagnostic(
        code(latchkey_oauth::config::not_hierarchical),
        help("use the provider's base URL, e.g. https://my-instance.zitadel.cloud")
    )]
    NotHierarchical(SmolStr),
}

/// Result of a session manager operation.
pub type Result<T> = core::result::Result<T, AuthError>;
