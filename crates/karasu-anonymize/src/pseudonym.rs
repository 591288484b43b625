//! Keyed pseudonym generation
//!
//! Placeholders derived from original values use HMAC-SHA256 with a
//! per-engine secret, so tokens are stable for equal inputs under one engine
//! but cannot be recomputed (or reversed by table lookup) without the key.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LEN: usize = 12;

#[derive(Clone)]
pub struct Pseudonymizer {
    key: [u8; 32],
}

impl Pseudonymizer {
    /// A pseudonymizer with a random per-deployment secret.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// A pseudonymizer with a fixed key, for deployments that need stable
    /// tokens across restarts.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Short hex token derived from the value.
    pub fn token(&self, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key size");
        mac.update(value.as_bytes());
        let digest = mac.finalize().into_bytes();
        hex::encode(&digest[..TOKEN_LEN / 2])
    }

    /// Token of the same length as the input, for hash-shaped values.
    pub fn token_like(&self, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key size");
        mac.update(value.as_bytes());
        let digest = mac.finalize().into_bytes();
        let mut out = hex::encode(digest);
        while out.len() < value.len() {
            let extended = out.clone();
            out.push_str(&extended);
        }
        out.truncate(value.len().max(TOKEN_LEN));
        out
    }
}

impl std::fmt::Debug for Pseudonymizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pseudonymizer").finish_non_exhaustive()
    }
}
