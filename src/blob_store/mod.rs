use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::image_hash::sha256_hex;

#[cfg(feature = "blob-memory")]
pub mod in_memory;
#[cfg(feature = "blob-local")]
pub mod local_fs;
pub mod package;

#[cfg(feature = "blob-memory")]
pub use in_memory::InMemoryStore;
#[cfg(feature = "blob-local")]
pub use local_fs::LocalFs;
pub use package::{FileInfo, ProofPackage};

/// Content-addressed storage for archived proof packages.
#[async_trait]
pub trait ProofStore {
    /// Initialize the store
    async fn init(&mut self) -> Result<()>;

    /// Check if a digest exists in the store
    async fn exists(&self, digest: &str) -> Result<bool>;

    /// Get a blob from the store
    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>>;

    /// Put a blob into the store and return its SHA-256 hex digest.
    /// If a digest is provided, it will be compared to the computed one. If they don't match, an error will be returned.
    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String>;
}

/// Calculates the SHA-256 digest of the blob.
/// If expected_digest is provided, it will be compared to the computed digest.
/// Returns OK(computed_digest) if the computed digest matches the expected digest.
fn calc_and_validate_digest(blob: &[u8], expected_digest: Option<&str>) -> Result<String> {
    let computed_digest = sha256_hex(blob);

    // validate digest if one was provided
    if let Some(digest) = expected_digest {
        if !digest.eq_ignore_ascii_case(&computed_digest) {
            return Err(anyhow!(
                "Computed digest '{computed_digest}' doesn't match provided digest '{digest}'.",
            ));
        }
    }
    Ok(computed_digest)
}
