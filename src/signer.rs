/// Ed25519 elliptic curve signer
pub mod ed25519_signer;

use anyhow::Result;
use async_trait::async_trait;
pub use ed25519_signer::*;

/// Trait for cryptographic signing operations.
///
/// Proofs only carry Ed25519 signatures, but the key may live outside the
/// process (an HSM, a remote notary), so signing is async and fallible.
#[async_trait]
pub trait Signer {
    /// Signs the provided data and returns a 64-byte signature.
    ///
    /// # Arguments
    ///
    /// * `data` - The data to sign.
    ///
    /// # Returns
    ///
    /// A 64-byte signature array.
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]>;

    /// Returns the raw 32-byte Ed25519 public key matching the signing key.
    async fn public_key(&self) -> Result<[u8; 32]>;
}
