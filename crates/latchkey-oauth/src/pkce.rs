use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng, rngs::ThreadRng};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

/// Length of a generated code verifier (RFC 7636 allows 43..=128).
pub const CODE_VERIFIER_LEN: usize = 64;
/// Length of a generated `state` nonce.
pub const STATE_LEN: usize = 16;

/// Random `[A-Za-z0-9]` string of `len` characters drawn from `rng`.
pub fn random_string_with<R>(rng: &mut R, len: usize) -> SmolStr
where
    R: Rng + CryptoRng,
{
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random `[A-Za-z0-9]` string of `len` characters from the thread-local CSPRNG.
pub fn generate_random_string(len: usize) -> SmolStr {
    random_string_with(&mut ThreadRng::default(), len)
}

/// Fresh PKCE code verifier.
pub fn generate_code_verifier() -> SmolStr {
    generate_random_string(CODE_VERIFIER_LEN)
}

/// Fresh CSRF nonce for the `state` parameter.
pub fn generate_state() -> SmolStr {
    generate_random_string(STATE_LEN)
}

/// S256 challenge: `BASE64URL(SHA256(verifier))` without padding.
// https://datatracker.ietf.org/doc/html/rfc7636#section-4.2
pub fn generate_code_challenge(verifier: &str) -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(Sha256::digest(verifier.as_bytes()))
        .into()
}

/// Fresh `(challenge, verifier)` pair.
pub fn generate_pkce() -> (SmolStr, SmolStr) {
    let verifier = generate_code_verifier();
    (generate_code_challenge(&verifier), verifier)
}
