// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secrets box for mount credentials.
//!
//! AES-256-GCM with a random 12-byte nonce prepended to each ciphertext.
//! Credentials stay encrypted in the store; the box decrypts them into a
//! short-lived [`MountCredentials`] just before a `mountStorage` command is
//! built.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;

use fleet_core::MountCredentials;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secrets key must be 64 hex chars (32 bytes)")]
    BadKey,

    #[error("ciphertext too short")]
    Truncated,

    #[error("decryption failed")]
    Decrypt,

    #[error("credential payload malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct SecretsBox {
    cipher: Aes256Gcm,
}

impl SecretsBox {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
    }

    /// Build from the hex key the daemon is configured with.
    pub fn from_hex(hex: &str) -> Result<Self, SecretsError> {
        if hex.len() != 64 {
            return Err(SecretsError::BadKey);
        }
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| SecretsError::BadKey)?;
        }
        Ok(Self::new(&key))
    }

    /// Encrypt a credential payload for storage. Used by the admin write
    /// path; kept next to `decrypt` so the layout has a single owner.
    pub fn encrypt(&self, credentials: &MountCredentials) -> Result<Vec<u8>, SecretsError> {
        let plaintext = serde_json::to_vec(credentials)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext =
            self.cipher.encrypt(nonce, plaintext.as_slice()).map_err(|_| SecretsError::Decrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a stored blob into live credentials.
    pub fn decrypt(&self, blob: &[u8]) -> Result<MountCredentials, SecretsError> {
        if blob.len() < NONCE_LEN {
            return Err(SecretsError::Truncated);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext =
            self.cipher.decrypt(nonce, ciphertext).map_err(|_| SecretsError::Decrypt)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
