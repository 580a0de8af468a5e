use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, trace};
use tokio::fs;

use crate::blob_store::{calc_and_validate_digest, ProofStore};

/// Stores each proof package as a file named by its digest.
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ProofStore for LocalFs {
    async fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    async fn exists(&self, digest: &str) -> Result<bool> {
        trace!("check exists {digest}.");

        let path = self.path.join(digest);
        let exists = fs::try_exists(path).await?;

        Ok(exists)
    }

    async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        trace!("get {digest}.");

        let path = self.path.join(digest);
        if fs::try_exists(&path).await? {
            let blob = fs::read(path).await?;
            Ok(Some(blob))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, blob: Vec<u8>, digest: Option<&str>) -> Result<String> {
        let digest = calc_and_validate_digest(&blob, digest)?;

        trace!("put {digest}. blob size: {}", blob.len());

        let path = self.path.join(&digest);
        if fs::try_exists(&path).await? {
            debug!("proof package {digest} already exists.");
        } else {
            fs::write(path, &blob).await?;
        }

        Ok(digest)
    }
}
