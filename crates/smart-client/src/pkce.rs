//! PKCE (RFC 7636) verifier, S256 challenge and OAuth `state`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

pub const CHALLENGE_METHOD: &str = "S256";

#[derive(Debug, Clone)]
pub struct PkceData {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl PkceData {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: [u8; 32] = rng.gen();
        let code_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let code_challenge = challenge_for(&code_verifier);

        let state_bytes: [u8; 16] = rng.gen();
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self {
            code_verifier,
            code_challenge,
            state,
        }
    }
}

impl Default for PkceData {
    fn default() -> Self {
        Self::new()
    }
}

/// base64url(sha256(verifier)), unpadded.
pub fn challenge_for(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
