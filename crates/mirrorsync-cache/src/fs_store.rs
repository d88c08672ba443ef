//! Filesystem implementation of IManifestStore
//!
//! Every key maps to a file below the store root (`{root}/{key}`). Writes go
//! to a staging file first and are renamed into place, so readers never see
//! a partially written object. Multipart parts are kept in a per-upload
//! directory under `{root}/.multipart/` until the upload completes or aborts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use mirrorsync_core::domain::CacheKey;
use mirrorsync_core::ports::{IManifestStore, IMultipartUpload, ObjectMeta, PartId};

use crate::{part_etag, CacheError};

const STAGING_DIR: &str = ".staging";
const MULTIPART_DIR: &str = ".multipart";

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Removes the staging file `tmp` when `result` is an error
async fn discard_on_error<T>(tmp: &Path, result: Result<T, CacheError>) -> Result<T, CacheError> {
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}

/// Blob store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    root: PathBuf,
}

impl FsManifestStore {
    /// Creates a store rooted at `root`; directories are created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Writes `data` to a staging file and renames it onto `target`
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<(), CacheError> {
        let staging = self.root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_err(&staging, e))?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let tmp = staging.join(Uuid::new_v4().to_string());
        let written = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| io_err(&tmp, e))?;
            file.write_all(data).await.map_err(|e| io_err(&tmp, e))?;
            file.sync_all().await.map_err(|e| io_err(&tmp, e))?;
            drop(file);

            tokio::fs::rename(&tmp, target)
                .await
                .map_err(|e| io_err(target, e))?;
            Ok::<_, CacheError>(())
        }
        .await;
        discard_on_error(&tmp, written).await
    }

    /// Removes empty directories from `dir` upward, stopping at the root
    async fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.root.as_path() || !current.starts_with(&self.root) {
                break;
            }
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

#[async_trait::async_trait]
impl IManifestStore for FsManifestStore {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e).into()),
        }
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> anyhow::Result<()> {
        let path = self.path_for(key);
        self.write_atomic(&path, &data).await?;
        tracing::trace!(key = %key, size = data.len(), "Stored object");
        Ok(())
    }

    async fn head(&self, key: &CacheKey) -> anyhow::Result<Option<ObjectMeta>> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMeta { size: meta.len() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e).into()),
        }
    }

    async fn create_multipart_upload(
        &self,
        key: &CacheKey,
    ) -> anyhow::Result<Box<dyn IMultipartUpload>> {
        let upload_id = Uuid::new_v4();
        let parts_dir = self.root.join(MULTIPART_DIR).join(upload_id.to_string());
        tokio::fs::create_dir_all(&parts_dir)
            .await
            .map_err(|e| io_err(&parts_dir, e))?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Multipart upload created");

        Ok(Box::new(FsMultipartUpload {
            store: self.clone(),
            target: self.path_for(key),
            parts_dir,
            received: HashMap::new(),
        }))
    }

    async fn delete(&self, key: &CacheKey) -> anyhow::Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_dirs(path.parent()).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e).into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<CacheKey>> {
        // Start from the deepest directory the prefix fully names
        let dir_part = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
        let start = self.root.join(dir_part);

        let mut keys = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err(&dir, e).into()),
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let relative: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                if relative.first().is_some_and(|first| first.starts_with('.')) {
                    continue;
                }

                let file_type = entry.file_type().await.map_err(|e| io_err(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let key = relative.join("/");
                    if key.starts_with(prefix) {
                        keys.push(CacheKey::new(key)?);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Multipart upload staged as numbered part files
struct FsMultipartUpload {
    store: FsManifestStore,
    target: PathBuf,
    parts_dir: PathBuf,
    received: HashMap<u32, String>,
}

impl FsMultipartUpload {
    fn part_path(&self, part_number: u32) -> PathBuf {
        self.parts_dir.join(format!("{part_number:05}"))
    }

    async fn assemble(&self, parts: &[PartId]) -> Result<(), CacheError> {
        let staging = self.store.root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_err(&staging, e))?;
        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let tmp = staging.join(Uuid::new_v4().to_string());
        let assembled = async {
            let mut out = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| io_err(&tmp, e))?;
            for part in parts {
                let path = self.part_path(part.part_number);
                let data = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
                out.write_all(&data).await.map_err(|e| io_err(&tmp, e))?;
            }
            out.sync_all().await.map_err(|e| io_err(&tmp, e))?;
            drop(out);

            tokio::fs::rename(&tmp, &self.target)
                .await
                .map_err(|e| io_err(&self.target, e))?;
            Ok::<_, CacheError>(())
        }
        .await;
        discard_on_error(&tmp, assembled).await
    }

    async fn discard_parts(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_dir_all(&self.parts_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.parts_dir, e)),
        }
    }
}

#[async_trait::async_trait]
impl IMultipartUpload for FsMultipartUpload {
    async fn upload_part(&mut self, part_number: u32, data: Bytes) -> anyhow::Result<PartId> {
        if part_number == 0 {
            return Err(CacheError::InvalidUpload("part numbers start at 1".to_string()).into());
        }

        let path = self.part_path(part_number);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| io_err(&path, e))?;

        let etag = part_etag(&data);
        self.received.insert(part_number, etag.clone());
        Ok(PartId { part_number, etag })
    }

    async fn complete(&mut self, parts: Vec<PartId>) -> anyhow::Result<()> {
        if parts.is_empty() {
            return Err(CacheError::InvalidUpload("no parts to complete".to_string()).into());
        }
        for part in &parts {
            if self.received.get(&part.part_number) != Some(&part.etag) {
                return Err(CacheError::InvalidUpload(format!(
                    "part {} was not uploaded with tag {}",
                    part.part_number, part.etag
                ))
                .into());
            }
        }

        self.assemble(&parts).await?;
        self.discard_parts().await?;
        self.received.clear();
        Ok(())
    }

    async fn abort(&mut self) -> anyhow::Result<()> {
        self.received.clear();
        self.discard_parts().await?;
        Ok(())
    }
}
