use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Base64url that also takes padded input.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Identity claims carried by the ID token.
///
/// The shape is provider-defined and not validated: every field is optional,
/// and anything not modelled here is kept in `extra`. A known claim with an
/// unexpected JSON type is left unset and its raw value stays in `extra`, so
/// one odd claim never costs the rest.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(from = "BTreeMap<SmolStr, Value>")]
pub struct UserClaims {
    /// Subject identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<SmolStr>,
    /// Full name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    /// Given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<SmolStr>,
    /// Family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<SmolStr>,
    /// Login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<SmolStr>,
    /// Primary email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<SmolStr>,
    /// Whether the provider verified `email`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Profile picture URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<SmolStr>,
    /// Preferred locale, e.g. `en-GB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<SmolStr>,
    /// Every other claim, and known claims of an unexpected type.
    #[serde(flatten)]
    pub extra: BTreeMap<SmolStr, Value>,
}

impl UserClaims {
    /// Best display name: `name`, then `preferred_username`, then `email`.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
    }

    /// Decode the payload (middle segment) of a compact JWT without verifying it.
    ///
    /// The signature is not checked; the token came straight from the token
    /// endpoint over TLS and is only used for display.
    pub fn from_id_token(token: &str) -> Result<Self, ClaimsError> {
        decode_jwt_payload(token)
    }
}

impl From<BTreeMap<SmolStr, Value>> for UserClaims {
    fn from(mut raw: BTreeMap<SmolStr, Value>) -> Self {
        let string = |v: &Value| v.as_str().map(SmolStr::new);
        Self {
            sub: take_claim(&mut raw, "sub", string),
            name: take_claim(&mut raw, "name", string),
            given_name: take_claim(&mut raw, "given_name", string),
            family_name: take_claim(&mut raw, "family_name", string),
            preferred_username: take_claim(&mut raw, "preferred_username", string),
            email: take_claim(&mut raw, "email", string),
            email_verified: take_claim(&mut raw, "email_verified", Value::as_bool),
            picture: take_claim(&mut raw, "picture", string),
            locale: take_claim(&mut raw, "locale", string),
            extra: raw,
        }
    }
}

/// Move `key` out of `raw` when `project` accepts it. Nulls are dropped.
fn take_claim<T>(
    raw: &mut BTreeMap<SmolStr, Value>,
    key: &str,
    project: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = raw.get(key)?;
    if value.is_null() {
        raw.remove(key);
        return None;
    }
    let projected = project(value)?;
    raw.remove(key);
    Some(projected)
}

/// Decode the middle segment of a compact JWT into `T`. No signature check.
pub fn decode_jwt_payload<T: DeserializeOwned>(token: &str) -> Result<T, ClaimsError> {
    let payload = token.split('.').nth(1).ok_or(ClaimsError::NotAJwt)?;
    // tolerate standard-alphabet encoders
    let payload = payload.replace('+', "-").replace('/', "_");
    let bytes = LENIENT_URL_SAFE.decode(payload.as_bytes())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Why an ID token payload could not be read.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClaimsError {
    /// Fewer than two dot-separated segments.
    #[error("token has no payload segment")]
    #[diagnostic(code(latchkey_oauth::claims::not_a_jwt))]
    NotAJwt,
    /// Payload is not base64url.
    #[error("payload is not base64: {0}")]
    #[diagnostic(code(latchkey_oauth::claims::base64))]
    Base64(#[from] base64::DecodeError),
    /// Payload is not a JSON object.
    #[error("payload is not a JSON claims object: {0}")]
    #[diagnostic(code(latchkey_oauth::claims::json))]
    Json(#[from] serde_json::Error),
}
