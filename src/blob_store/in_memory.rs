use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::blob_store::{calc_and_validate_digest, ProofStore};

/// In-memory proof storage for testing
///
/// Stores blobs in a HashMap. Not persistent. Used for testing and development.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Map of digests to blob data
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ProofStore for InMemoryStore {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        log::trace!("check exists {digest}.");

        let exists = self.blobs.read().await.contains_key(digest);

        Ok(exists)
    }

    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        log::trace!("get {digest}.");

        let blob = self.blobs.read().await.get(digest).map(ToOwned::to_owned);

        Ok(blob)
    }

    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String> {
        let digest = calc_and_validate_digest(&blob, digest)?;

        log::trace!("put {digest}. blob size: {}", blob.len());

        self.blobs
            .write()
            .await
            .entry(digest.clone())
            .or_insert(blob);

        Ok(digest)
    }
}
