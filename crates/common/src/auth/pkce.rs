//! PKCE (Proof Key for Code Exchange) for the identity provider login
//!
//! Implements the S256 method of RFC 7636. A fresh [`PkcePair`] is created
//! for every full-login attempt and dropped once the authorization code has
//! been exchanged; it is never persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a code verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes behind the `state` and `nonce` parameters.
const STATE_BYTES: usize = 16;

/// The only challenge method the provider accepts.
pub const CHALLENGE_METHOD: &str = "S256";

/// Compute the code challenge for a verifier
///
/// `BASE64URL-NOPAD(SHA256(ASCII(verifier)))`. Pure and deterministic.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Verifier/challenge pair plus the per-attempt `state` and `nonce`
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Secret sent only with the token exchange
    pub verifier: String,

    /// SHA-256 of the verifier, sent with the authorization request
    pub challenge: String,

    /// Opaque value echoed back on the final redirect
    pub state: String,

    /// Replay protection bound into the id token
    pub nonce: String,
}

impl PkcePair {
    /// Generate a new pair from the thread-local CSPRNG
    ///
    /// # Examples
    /// ```
    /// use audilink_common::auth::pkce::{code_challenge, PkcePair};
    ///
    /// let pair = PkcePair::generate();
    /// assert_eq!(pair.verifier.len(), 43);
    /// assert_eq!(pair.challenge, code_challenge(&pair.verifier));
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes::<VERIFIER_BYTES>());
        let challenge = code_challenge(&verifier);

        Self {
            verifier,
            challenge,
            state: hex::encode(random_bytes::<STATE_BYTES>()),
            nonce: hex::encode(random_bytes::<STATE_BYTES>()),
        }
    }

    /// Challenge method sent alongside [`Self::challenge`]
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}
