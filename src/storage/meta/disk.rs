use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::digest::ContentDigest;
use crate::error::StoreError;

use super::{MetaBackend, Variant};

/// Filesystem metadata backend. Each key's variant list is a JSON document
/// at a path derived from the key's digest, with the same two-level fan-out
/// as the blob store. Writes go through a temp file and an atomic rename so
/// readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct DiskMetaStore {
    root: PathBuf,
}

impl DiskMetaStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = ContentDigest::of(key.as_bytes());
        let hex = digest.as_str();
        let (first, remainder) = hex.split_at(2);
        let (second, _) = remainder.split_at(2);
        self.root.join(first).join(second).join(hex)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("tmp_{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl MetaBackend for DiskMetaStore {
    async fn read(&self, key: &str) -> Result<Vec<Variant>, StoreError> {
        match async_fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, variants: Vec<Variant>) -> Result<(), StoreError> {
        let document = serde_json::to_vec(&variants)?;
        let temp_path = self.temp_path();

        let mut options = async_fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path).await?;

        let write_result: Result<(), StoreError> = async {
            file.write_all(&document).await?;
            file.flush().await?;
            Ok(())
        }
        .await;
        if let Err(err) = write_result {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(err);
        }
        drop(file);

        let final_path = self.entry_path(key);
        if let Some(parent) = final_path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::rename(&temp_path, &final_path).await?;
        trace!(key, variants = variants.len(), "metadata entry committed");
        Ok(())
    }

    async fn purge(&self, key: &str) -> Result<(), StoreError> {
        match async_fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
