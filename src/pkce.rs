use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE material for one authorization-code round trip.
///
/// The verifier stays with the pending login (client side); only the S256
/// challenge travels in the authorization URL.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier (64 URL-safe chars, within the RFC 7636
    /// 43-128 range) and its S256 challenge.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_urlsafe::<48>();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }

    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Recompute the S256 challenge for a stored verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// Random `state` parameter binding the callback to this login attempt.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe::<16>()
}

/// Random `nonce` claim binding the issued ID token to this login attempt.
#[must_use]
pub fn generate_nonce() -> String {
    random_urlsafe::<16>()
}

fn random_urlsafe<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
