use std::fmt;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey, SECRET_KEY_LENGTH};
use rand_core::OsRng;

use crate::signer::Signer;

/// Represents a signer that uses an in-process Ed25519 key pair.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &hex::encode(self.signing_key.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

impl Ed25519Signer {
    /// Creates a new Ed25519Signer instance with a randomly generated key pair.
    pub fn create() -> Self {
        Ed25519Signer {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Imports an Ed25519Signer instance from a given secret key.
    ///
    /// # Arguments
    ///
    /// * `secret_key` - The 32-byte secret key (seed) to import.
    ///
    /// # Returns
    ///
    /// A new `Ed25519Signer`, or an error if the key is not 32 bytes.
    pub fn import(secret_key: &[u8]) -> Result<Self> {
        let seed: [u8; SECRET_KEY_LENGTH] = secret_key.try_into().map_err(|_| {
            anyhow!(
                "Ed25519 secret key must be {SECRET_KEY_LENGTH} bytes, got {}",
                secret_key.len()
            )
        })?;

        Ok(Ed25519Signer {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Wraps an already decoded signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Ed25519Signer { signing_key }
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        log::trace!("Signing {} bytes with Ed25519 key", data.len());
        Ok(self.signing_key.sign(data).to_bytes())
    }

    async fn public_key(&self) -> Result<[u8; 32]> {
        Ok(self.signing_key.verifying_key().to_bytes())
    }
}
