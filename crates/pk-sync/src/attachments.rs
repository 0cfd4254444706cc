//! Attachment lifecycle: keeps a blob object and its document-embedded
//! metadata record in agreement.
//!
//! Upload and delete are ordered pipelines over two stores that share no
//! transaction. A failure between steps leaves a documented inconsistency
//! window — an orphaned blob (uploaded but unreferenced) or a dangling
//! record (referencing a deleted blob) — surfaced as `PartialFailure` and
//! never repaired automatically. An orphaned blob is absent from every
//! entity's `attachments` sequence, so it is unreachable through normal
//! traversal and is never presented as a valid attachment.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use pk_core::{
    Attachment, BlobMetadata, BlobStore, Document, DocumentStore, OwnerKind, PkError, PkResult,
    WorkflowStage,
};

use crate::cache::SessionCache;

/// An in-memory file handed over by the upload UI.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct AttachmentLifecycle {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<SessionCache>,
}

impl AttachmentLifecycle {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<SessionCache>,
    ) -> Self {
        Self { docs, blobs, cache }
    }

    /// Upload a file and append its metadata record to the owner entity.
    ///
    /// Steps, strictly sequential: validate, derive the storage key, upload
    /// the bytes, obtain the retrieval URL, append the record to the owner's
    /// `attachments` sequence. A failure before the upload has no side
    /// effects; a failure after it orphans the blob and is reported as
    /// `PartialFailure` without deleting the uploaded bytes.
    pub async fn upload(
        &self,
        file: &FileSource,
        owner: OwnerKind,
        owner_id: &str,
        uploaded_by: &str,
    ) -> PkResult<Attachment> {
        if file.name.trim().is_empty() {
            return Err(PkError::InvalidArgument("file has no name".into()));
        }
        if owner_id.is_empty() {
            return Err(PkError::InvalidArgument("missing owner id".into()));
        }
        if uploaded_by.is_empty() {
            return Err(PkError::InvalidArgument("missing uploader id".into()));
        }

        // Time-ordered unique key; safe under concurrent uploads of
        // identically named files without a coordination round-trip.
        let key = storage_key(&file.name);
        let path = blob_path(owner, owner_id, &key);
        let metadata = BlobMetadata {
            content_type: file.content_type.clone(),
            uploaded_by: uploaded_by.to_string(),
            original_name: file.name.clone(),
        };

        self.blobs.upload(&path, &file.bytes, &metadata).await?;

        let url = self
            .blobs
            .download_url(&path)
            .await
            .map_err(|err| PkError::partial(WorkflowStage::BlobUploaded, err))?;

        let attachment = Attachment {
            id: key,
            name: file.name.clone(),
            size: file.bytes.len() as u64,
            content_type: file.content_type.clone(),
            url,
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Utc::now(),
        };

        if let Err(err) = self.append_record(owner, owner_id, &attachment).await {
            warn!(path, owner = %owner, owner_id, "metadata write failed; blob is orphaned");
            return Err(PkError::partial(WorkflowStage::BlobUploaded, err));
        }

        self.cache.invalidate_collection(owner.collection()).await;
        debug!(owner = %owner, owner_id, id = attachment.id, "attachment uploaded");
        Ok(attachment)
    }

    /// Delete an attachment: blob object first, then the embedded record.
    ///
    /// If the blob deletion fails the record is deliberately left intact and
    /// the whole operation fails — the record must not stop referencing a
    /// blob that may still exist. If the record removal fails after the blob
    /// is gone, the record dangles; reported as `PartialFailure`.
    pub async fn delete(
        &self,
        owner: OwnerKind,
        owner_id: &str,
        attachment: &Attachment,
    ) -> PkResult<()> {
        if owner_id.is_empty() {
            return Err(PkError::InvalidArgument("missing owner id".into()));
        }
        if attachment.id.is_empty() {
            return Err(PkError::InvalidArgument("missing attachment id".into()));
        }

        let path = blob_path(owner, owner_id, &attachment.id);
        self.blobs.delete(&path).await?;

        if let Err(err) = self.remove_record(owner, owner_id, &attachment.id).await {
            warn!(path, owner = %owner, owner_id, "record removal failed; record dangles");
            return Err(PkError::partial(WorkflowStage::BlobDeleted, err));
        }

        self.cache.invalidate_collection(owner.collection()).await;
        debug!(owner = %owner, owner_id, id = attachment.id, "attachment deleted");
        Ok(())
    }

    async fn append_record(
        &self,
        owner: OwnerKind,
        owner_id: &str,
        attachment: &Attachment,
    ) -> PkResult<()> {
        let collection = owner.collection();
        let doc = self
            .docs
            .get(collection, owner_id)
            .await?
            .ok_or_else(|| PkError::not_found(collection, owner_id))?;

        let mut attachments = embedded_attachments(&doc);
        attachments.push(serde_json::to_value(attachment)?);

        let mut patch = Document::new();
        patch.insert("attachments".into(), Value::Array(attachments));
        self.docs.update(collection, owner_id, patch).await?;
        Ok(())
    }

    async fn remove_record(
        &self,
        owner: OwnerKind,
        owner_id: &str,
        attachment_id: &str,
    ) -> PkResult<()> {
        let collection = owner.collection();
        let doc = self
            .docs
            .get(collection, owner_id)
            .await?
            .ok_or_else(|| PkError::not_found(collection, owner_id))?;

        let mut attachments = embedded_attachments(&doc);
        attachments.retain(|entry| entry.get("id").and_then(Value::as_str) != Some(attachment_id));

        let mut patch = Document::new();
        patch.insert("attachments".into(), Value::Array(attachments));
        self.docs.update(collection, owner_id, patch).await?;
        Ok(())
    }
}

fn embedded_attachments(doc: &Document) -> Vec<Value> {
    doc.get("attachments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn blob_path(owner: OwnerKind, owner_id: &str, key: &str) -> String {
    format!("{owner}/{owner_id}/{key}")
}

fn storage_key(file_name: &str) -> String {
    format!("{}-{}", Uuid::now_v7(), sanitize_file_name(file_name))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
