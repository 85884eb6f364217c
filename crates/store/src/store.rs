//! JSON-file backed key/value store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use meshforge_core::types::AssetId;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::record::{MetadataRecord, RecordPatch};

type Records = BTreeMap<AssetId, MetadataRecord>;

/// Mutex-serialized metadata store.
///
/// The whole map is kept in memory and written through to disk on every
/// mutation. Writes go to a sibling temp file that is then renamed over
/// the target, so readers never observe a partially written file.
pub struct MetadataStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl MetadataStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Records::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), count = records.len(), "Metadata store opened");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every record.
    pub async fn get_all(&self) -> BTreeMap<AssetId, MetadataRecord> {
        self.records.lock().await.clone()
    }

    /// One record, if present.
    pub async fn get(&self, id: &str) -> Option<MetadataRecord> {
        self.records.lock().await.get(id).cloned()
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.records.lock().await.contains_key(id)
    }

    /// Merge `patch` into the record for `id` (creating it if absent),
    /// stamp it, and persist the store.
    ///
    /// On a persistence failure the in-memory map is left unchanged.
    pub async fn upsert_merge(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<MetadataRecord, StoreError> {
        let mut records = self.records.lock().await;
        let now = Utc::now();

        let mut record = records.get(id).cloned().unwrap_or_else(|| MetadataRecord {
            created: Some(now),
            ..Default::default()
        });
        record.merge(patch);
        record.updated = Some(now);

        let mut next = records.clone();
        next.insert(id.to_string(), record.clone());
        self.persist(&next).await?;
        *records = next;

        Ok(record)
    }

    /// Delete the record for `id`. Returns `false` if it did not exist.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        if !records.contains_key(id) {
            return Ok(false);
        }

        let mut next = records.clone();
        next.remove(id);
        self.persist(&next).await?;
        *records = next;

        Ok(true)
    }

    /// Confirm the backing file is reachable (a file that has not been
    /// created yet counts as healthy).
    pub async fn health_check(&self) -> Result<(), StoreError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ---- private helpers ----

    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meshforge_core::status::AssetStatus;

    use super::*;
    use crate::record::FileRef;

    async fn temp_store() -> (tempfile::TempDir, MetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("metadata.json"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upsert_creates_and_stamps() {
        let (_dir, store) = temp_store().await;
        let record = store
            .upsert_merge("a", RecordPatch::status(AssetStatus::Processing))
            .await
            .unwrap();

        assert_eq!(record.status, Some(AssetStatus::Processing));
        assert!(record.created.is_some());
        assert!(record.updated.is_some());
        assert!(store.exists("a").await);
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_record() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_merge("a", RecordPatch::status(AssetStatus::Processing))
            .await
            .unwrap();
        let created = store.get("a").await.unwrap().created;

        store
            .upsert_merge(
                "a",
                RecordPatch::default().with_video(FileRef {
                    file: "a-preview.mp4".into(),
                    path: "/assets/videos/a-preview.mp4".into(),
                }),
            )
            .await
            .unwrap();

        let record = store.get("a").await.unwrap();
        assert_eq!(record.status, Some(AssetStatus::Processing));
        assert!(record.video.is_some());
        assert_eq!(record.created, created);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metadata.json");
        {
            let store = MetadataStore::open(&path).await.unwrap();
            store
                .upsert_merge("a", RecordPatch::status(AssetStatus::Complete))
                .await
                .unwrap();
        }

        let reopened = MetadataStore::open(&path).await.unwrap();
        let all = reopened.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all["a"].status, Some(AssetStatus::Complete));
    }

    #[tokio::test]
    async fn remove_reports_whether_record_existed() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_merge("a", RecordPatch::status(AssetStatus::Processing))
            .await
            .unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert!(store.get("a").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_upserts_all_land() {
        let (dir, store) = temp_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert_merge(&format!("asset-{i}"), RecordPatch::status(AssetStatus::Processing))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = MetadataStore::open(dir.path().join("metadata.json"))
            .await
            .unwrap();
        assert_eq!(reopened.get_all().await.len(), 32);
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        tokio::fs::write(&path, b"[not json").await.unwrap();

        let result = MetadataStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
