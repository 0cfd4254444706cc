use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::PkResult;
use crate::model::Collection;

/// A raw document as stored remotely: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Equality constraints for a list query. Constraints are kept sorted by
/// field name so that two filters that are equal by value produce the same
/// canonical signature, which is what cache scopes are keyed on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    constraints: BTreeMap<String, Value>,
}

impl Filter {
    /// The unfiltered scope: every document in the collection.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Whether a document satisfies every constraint.
    pub fn matches(&self, doc: &Document) -> bool {
        self.constraints
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    /// Canonical string form; equal-by-value filters share a signature.
    pub fn signature(&self) -> String {
        if self.constraints.is_empty() {
            return "*".to_string();
        }
        self.constraints
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Sort directive for list queries.
#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    /// Newest records first, the default ordering for every screen.
    pub fn created_desc() -> Self {
        Self {
            field: "createdAt",
            descending: true,
        }
    }
}

/// Document side of the remote store.
///
/// Per-call success or failure only: no multi-document transactions and no
/// row-level locking. `set` and `update` assign server timestamps; clients
/// never supply `createdAt`/`updatedAt`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reserve a fresh identifier in the collection without writing anything.
    async fn allocate_id(&self, collection: Collection) -> PkResult<String>;

    async fn get(&self, collection: Collection, id: &str) -> PkResult<Option<Document>>;

    async fn list(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<OrderBy>,
    ) -> PkResult<Vec<Document>>;

    /// Write a full record. Assigns `id` and server timestamps (`createdAt`
    /// is preserved if the record already exists). Returns the stored record.
    async fn set(&self, collection: Collection, id: &str, doc: Document) -> PkResult<Document>;

    /// Merge only the supplied fields into an existing record and refresh
    /// `updatedAt`. Fails with `NotFound` if the record is absent. Returns
    /// the new `updatedAt`.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> PkResult<DateTime<Utc>>;

    /// Remove a record. Deleting an absent record succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> PkResult<()>;
}

/// Out-of-band metadata carried with an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub content_type: String,
    pub uploaded_by: String,
    pub original_name: String,
}

/// Blob side of the remote store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8], metadata: &BlobMetadata) -> PkResult<()>;

    /// A durable retrieval URL for an uploaded object.
    async fn download_url(&self, path: &str) -> PkResult<String>;

    async fn delete(&self, path: &str) -> PkResult<()>;
}

/// The authentication service, reduced to the one question this layer asks.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user's id, or `None` when signed out.
    async fn current_uid(&self) -> PkResult<Option<String>>;
}

fn _assert_document_store_object_safe(_: &dyn DocumentStore) {}
fn _assert_blob_store_object_safe(_: &dyn BlobStore) {}
fn _assert_auth_provider_object_safe(_: &dyn AuthProvider) {}
