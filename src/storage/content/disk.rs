use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs as async_fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use crate::body::Body;
use crate::digest::{ContentDigest, Hasher};
use crate::error::StoreError;

use super::ContentStore;

const WRITE_CHUNK: usize = 8 * 1024;

/// Filesystem blob store. Bodies stream through a uniquely named temp file
/// while being hashed, then move atomically to a digest-derived path with a
/// two-level directory fan-out (`aa/bb/<digest>`), so an interrupted write
/// never surfaces under a discoverable digest.
#[derive(Debug, Clone)]
pub struct DiskContentStore {
    root: PathBuf,
}

impl DiskContentStore {
    /// Create the store, creating the root directory if needed. Directory
    /// creation failures are construction-time errors.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.as_str();
        let (first, remainder) = hex.split_at(2);
        let (second, _) = remainder.split_at(2);
        self.root.join(first).join(second).join(hex)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("tmp_{}", uuid::Uuid::new_v4()))
    }

    async fn open_temp(&self, path: &Path) -> Result<async_fs::File, StoreError> {
        let mut options = async_fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        Ok(options.open(path).await?)
    }
}

#[async_trait]
impl ContentStore for DiskContentStore {
    async fn write(&self, body: Body) -> Result<(ContentDigest, u64), StoreError> {
        let temp_path = self.temp_path();
        let mut file = self.open_temp(&temp_path).await?;
        let mut hasher = Hasher::new();
        let mut size = 0u64;

        let write_result: Result<(), StoreError> = async {
            match body {
                Body::Empty => {}
                Body::Full(bytes) => {
                    hasher.update(&bytes);
                    size = bytes.len() as u64;
                    file.write_all(&bytes).await?;
                }
                Body::Reader(mut reader) => {
                    let mut chunk = [0u8; WRITE_CHUNK];
                    loop {
                        let n = reader.read(&mut chunk).await?;
                        if n == 0 {
                            break;
                        }
                        hasher.update(&chunk[..n]);
                        size += n as u64;
                        file.write_all(&chunk[..n]).await?;
                    }
                }
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(err);
        }
        drop(file);

        let digest = hasher.finish();
        let final_path = self.blob_path(&digest);
        if async_fs::metadata(&final_path).await.is_ok() {
            // A concurrent writer of the same content already committed;
            // discard the in-flight copy rather than overwrite.
            let _ = async_fs::remove_file(&temp_path).await;
            trace!(digest = %digest, "content blob already present");
        } else {
            if let Some(parent) = final_path.parent() {
                async_fs::create_dir_all(parent).await?;
            }
            async_fs::rename(&temp_path, &final_path).await?;
            trace!(digest = %digest, size, "content blob committed");
        }
        Ok((digest, size))
    }

    async fn read(&self, digest: &ContentDigest) -> Result<Option<Bytes>, StoreError> {
        match async_fs::read(self.blob_path(digest)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn open(&self, digest: &ContentDigest) -> Result<Option<Body>, StoreError> {
        match async_fs::File::open(self.blob_path(digest)).await {
            Ok(file) => Ok(Some(Body::from_reader(file))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        Ok(async_fs::metadata(self.blob_path(digest)).await.is_ok())
    }

    async fn purge(&self, digest: &ContentDigest) -> Result<(), StoreError> {
        match async_fs::remove_file(self.blob_path(digest)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
