//! In-memory document and blob stores.
//!
//! Behave like the remote backends this layer is written against: per-call
//! success or failure, server-assigned identifiers and timestamps, no
//! multi-document transactions. Failure injection hooks let tests exercise
//! the partial-failure windows of multi-step workflows.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use pk_core::{
    BlobMetadata, BlobStore, Collection, Document, DocumentStore, Filter, OrderBy, PkError,
    PkResult,
};

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<Collection, BTreeMap<String, Document>>>,
    /// Last issued server timestamp; the next one is always strictly later.
    clock: Mutex<DateTime<Utc>>,
    list_calls: AtomicU64,
    fail_next_update: AtomicBool,
    fail_next_set: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
            list_calls: AtomicU64::new(0),
            fail_next_update: AtomicBool::new(false),
            fail_next_set: AtomicBool::new(false),
        }
    }

    /// Make the next `update` call fail with `Unavailable`.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    /// Make the next `set` call fail with `Unavailable`.
    pub fn fail_next_set(&self) {
        self.fail_next_set.store(true, Ordering::SeqCst);
    }

    /// How many `list` calls have reached the store. Used to assert that
    /// concurrent fetches of one scope are de-duplicated.
    pub fn list_call_count(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Next server timestamp: wall clock, nudged forward when the wall clock
    /// has not advanced so `updatedAt` strictly increases.
    async fn stamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock().await;
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + Duration::milliseconds(1)
        };
        *last = next;
        next
    }

    fn take_flag(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_stamp(doc: &Document, field: &str) -> DateTime<Utc> {
    doc.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn allocate_id(&self, _collection: Collection) -> PkResult<String> {
        Ok(Uuid::now_v7().to_string())
    }

    async fn get(&self, collection: Collection, id: &str) -> PkResult<Option<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<OrderBy>,
    ) -> PkResult<Vec<Document>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.lock().await;
        let mut docs: Vec<Document> = collections
            .get(&collection)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = order {
            docs.sort_by_key(|d| parse_stamp(d, order.field));
            if order.descending {
                docs.reverse();
            }
        }
        Ok(docs)
    }

    async fn set(&self, collection: Collection, id: &str, mut doc: Document) -> PkResult<Document> {
        if Self::take_flag(&self.fail_next_set) {
            return Err(PkError::Unavailable("injected set failure".into()));
        }
        if id.is_empty() {
            return Err(PkError::InvalidArgument("empty document id".into()));
        }

        let stamp = self.stamp().await;
        let stamp_value = serde_json::to_value(stamp)?;

        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection).or_default();

        doc.insert("id".into(), Value::String(id.to_string()));
        match docs.get(id).and_then(|existing| existing.get("createdAt")) {
            Some(created) => {
                doc.insert("createdAt".into(), created.clone());
            }
            None => {
                doc.insert("createdAt".into(), stamp_value.clone());
            }
        }
        doc.insert("updatedAt".into(), stamp_value);

        docs.insert(id.to_string(), doc.clone());
        debug!(collection = %collection, id, "document written");
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> PkResult<DateTime<Utc>> {
        if Self::take_flag(&self.fail_next_update) {
            return Err(PkError::Unavailable("injected update failure".into()));
        }

        let stamp = self.stamp().await;
        let stamp_value = serde_json::to_value(stamp)?;

        let mut collections = self.collections.lock().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PkError::not_found(collection, id))?;

        for (field, value) in patch {
            // Server-owned fields cannot be overwritten by a patch.
            if field == "id" || field == "createdAt" || field == "updatedAt" {
                continue;
            }
            doc.insert(field, value);
        }
        doc.insert("updatedAt".into(), stamp_value);
        debug!(collection = %collection, id, "document updated");
        Ok(stamp)
    }

    async fn delete(&self, collection: Collection, id: &str) -> PkResult<()> {
        let mut collections = self.collections.lock().await;
        if let Some(docs) = collections.get_mut(&collection) {
            // Removing an absent record is a success: the end state matches.
            docs.remove(id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

struct StoredBlob {
    bytes: Vec<u8>,
    metadata: BlobMetadata,
}

pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredBlob>>,
    fail_next_upload: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_next_upload: AtomicBool::new(false),
            fail_next_delete: AtomicBool::new(false),
        }
    }

    pub fn fail_next_upload(&self) {
        self.fail_next_upload.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.lock().await.contains_key(path)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn metadata(&self, path: &str) -> Option<BlobMetadata> {
        self.objects
            .lock()
            .await
            .get(path)
            .map(|blob| blob.metadata.clone())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8], metadata: &BlobMetadata) -> PkResult<()> {
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(PkError::Unavailable("injected upload failure".into()));
        }
        if path.is_empty() {
            return Err(PkError::InvalidArgument("empty blob path".into()));
        }
        self.objects.lock().await.insert(
            path.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                metadata: metadata.clone(),
            },
        );
        debug!(path, size = bytes.len(), "blob uploaded");
        Ok(())
    }

    async fn download_url(&self, path: &str) -> PkResult<String> {
        let objects = self.objects.lock().await;
        if objects.contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(PkError::NotFound(format!("blob {path}")))
        }
    }

    async fn delete(&self, path: &str) -> PkResult<()> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(PkError::Unavailable("injected delete failure".into()));
        }
        let mut objects = self.objects.lock().await;
        if objects.remove(path).is_none() {
            return Err(PkError::NotFound(format!("blob {path}")));
        }
        debug!(path, "blob deleted");
        Ok(())
    }
}
