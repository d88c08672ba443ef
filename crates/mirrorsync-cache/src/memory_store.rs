//! In-memory implementation of IManifestStore
//!
//! Objects live in a shared [`DashMap`]; clones of the store see the same
//! objects. Used by tests and by the `memory` store backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use uuid::Uuid;

use mirrorsync_core::domain::CacheKey;
use mirrorsync_core::ports::{IManifestStore, IMultipartUpload, ObjectMeta, PartId};

use crate::{part_etag, CacheError};

/// Shared in-memory blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryManifestStore {
    objects: Arc<DashMap<CacheKey, Bytes>>,
    open_uploads: Arc<DashMap<Uuid, CacheKey>>,
}

impl MemoryManifestStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of multipart uploads neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.open_uploads.len()
    }
}

#[async_trait::async_trait]
impl IManifestStore for MemoryManifestStore {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        Ok(self.objects.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> anyhow::Result<()> {
        self.objects.insert(key.clone(), data);
        Ok(())
    }

    async fn head(&self, key: &CacheKey) -> anyhow::Result<Option<ObjectMeta>> {
        Ok(self.objects.get(key).map(|v| ObjectMeta {
            size: v.value().len() as u64,
        }))
    }

    async fn create_multipart_upload(
        &self,
        key: &CacheKey,
    ) -> anyhow::Result<Box<dyn IMultipartUpload>> {
        let id = Uuid::new_v4();
        self.open_uploads.insert(id, key.clone());
        Ok(Box::new(MemoryMultipartUpload {
            id,
            key: key.clone(),
            store: self.clone(),
            parts: BTreeMap::new(),
        }))
    }

    async fn delete(&self, key: &CacheKey) -> anyhow::Result<bool> {
        Ok(self.objects.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self
            .objects
            .iter()
            .filter(|entry| entry.key().as_str().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

struct MemoryMultipartUpload {
    id: Uuid,
    key: CacheKey,
    store: MemoryManifestStore,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[async_trait::async_trait]
impl IMultipartUpload for MemoryMultipartUpload {
    async fn upload_part(&mut self, part_number: u32, data: Bytes) -> anyhow::Result<PartId> {
        if part_number == 0 {
            return Err(CacheError::InvalidUpload("part numbers start at 1".to_string()).into());
        }
        let etag = part_etag(&data);
        self.parts.insert(part_number, (etag.clone(), data));
        Ok(PartId { part_number, etag })
    }

    async fn complete(&mut self, parts: Vec<PartId>) -> anyhow::Result<()> {
        if parts.is_empty() {
            return Err(CacheError::InvalidUpload("no parts to complete".to_string()).into());
        }

        let mut assembled = BytesMut::new();
        for part in &parts {
            match self.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => assembled.extend_from_slice(data),
                _ => {
                    return Err(CacheError::InvalidUpload(format!(
                        "part {} was not uploaded with tag {}",
                        part.part_number, part.etag
                    ))
                    .into())
                }
            }
        }

        self.store.objects.insert(self.key.clone(), assembled.freeze());
        self.store.open_uploads.remove(&self.id);
        self.parts.clear();
        Ok(())
    }

    async fn abort(&mut self) -> anyhow::Result<()> {
        self.parts.clear();
        self.store.open_uploads.remove(&self.id);
        Ok(())
    }
}
