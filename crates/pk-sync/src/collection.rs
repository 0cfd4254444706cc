//! Typed per-collection facade over the remote document store and the
//! session cache. Every screen's fetch/create/update/delete goes through
//! here; mutations never touch the cache until the remote write has been
//! confirmed, so the cache always reflects last-known-good remote state.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use pk_core::{wire, Document, DocumentStore, Filter, OrderBy, PkError, PkResult, Record};

use crate::cache::{ScopeKey, SessionCache};

pub struct CollectionClient<T: Record> {
    store: Arc<dyn DocumentStore>,
    cache: Arc<SessionCache>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for CollectionClient<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> CollectionClient<T> {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<SessionCache>) -> Self {
        Self {
            store,
            cache,
            _marker: PhantomData,
        }
    }

    /// The records matching `filter`, newest first.
    ///
    /// Serves from the cache when the scope is present and valid; otherwise
    /// lists remotely and repopulates the scope. Concurrent callers of the
    /// same scope share a single remote call: the per-scope fetch lock is
    /// acquired on a miss and the cache re-checked after acquisition.
    pub async fn fetch(&self, filter: &Filter) -> PkResult<Vec<T>> {
        let key = ScopeKey::new(T::COLLECTION, filter);
        if let Some(docs) = self.cache.get(&key).await {
            return decode_all(&docs);
        }

        let lock = self.cache.fetch_lock(&key).await;
        let _guard = lock.lock().await;
        if let Some(docs) = self.cache.get(&key).await {
            return decode_all(&docs);
        }

        let docs = self
            .store
            .list(T::COLLECTION, filter, Some(OrderBy::created_desc()))
            .await?;
        debug!(
            collection = %T::COLLECTION,
            scope = key.signature(),
            count = docs.len(),
            "scope fetched"
        );
        let decoded = decode_all(&docs)?;
        self.cache.put(key, docs).await;
        Ok(decoded)
    }

    /// The unfiltered scope: every record in the collection.
    pub async fn fetch_all(&self) -> PkResult<Vec<T>> {
        self.fetch(&Filter::none()).await
    }

    /// Direct point read, bypassing the cache.
    pub async fn get(&self, id: &str) -> PkResult<Option<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(wire::decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Persist a draft record. Client-supplied id/timestamps and absent
    /// fields are stripped before the write; the store assigns the id and
    /// both timestamps. Every cached scope of the collection is invalidated,
    /// since the new record may satisfy any filter.
    pub async fn create(&self, draft: &T) -> PkResult<T> {
        let doc = wire::for_create(draft)?;
        let id = self.store.allocate_id(T::COLLECTION).await?;
        let stored = self.store.set(T::COLLECTION, &id, doc).await?;
        self.cache.invalidate_collection(T::COLLECTION).await;
        debug!(collection = %T::COLLECTION, id, "record created");
        wire::decode(stored)
    }

    /// Write only the supplied fields of an existing record. Fails with
    /// `NotFound` if the record is absent remotely. Invalidation is
    /// collection-wide: a partial update may change which filters the record
    /// matches (e.g. reassigning `opportunityId`).
    pub async fn update<P: Serialize>(&self, id: &str, patch: &P) -> PkResult<()> {
        let doc = wire::for_update(patch)?;
        if doc.is_empty() {
            return Err(PkError::InvalidArgument("update contains no fields".into()));
        }
        self.store.update(T::COLLECTION, id, doc).await?;
        self.cache.invalidate_collection(T::COLLECTION).await;
        debug!(collection = %T::COLLECTION, id, "record updated");
        Ok(())
    }

    /// Remove a record. Deleting an already-absent record is a success: the
    /// end state matches the caller's intent.
    pub async fn delete(&self, id: &str) -> PkResult<()> {
        match self.store.delete(T::COLLECTION, id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        self.cache.invalidate_collection(T::COLLECTION).await;
        debug!(collection = %T::COLLECTION, id, "record deleted");
        Ok(())
    }
}

fn decode_all<T: Record>(docs: &[Document]) -> PkResult<Vec<T>> {
    docs.iter().cloned().map(wire::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use pk_core::{Collection, Lead, LeadPatch, LeadStatus};
    use pk_store::MemoryDocumentStore;

    fn client<T: Record>(store: Arc<dyn DocumentStore>) -> CollectionClient<T> {
        CollectionClient::new(store, Arc::new(SessionCache::new()))
    }

    #[tokio::test]
    async fn create_assigns_id_and_server_timestamps() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        let mut draft = Lead::new("Acme", "Jo", "jo@acme.com", "Website");
        draft.id = "client-chosen".into();
        let created = leads.create(&draft).await.unwrap();

        assert!(!created.id.is_empty());
        assert_ne!(created.id, "client-chosen");
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn fetch_after_create_sees_the_new_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        // Warm the cache, then mutate: the mutation must invalidate it.
        assert!(leads.fetch_all().await.unwrap().is_empty());
        let created = leads
            .create(&Lead::new("Acme", "Jo", "jo@acme.com", "Website"))
            .await
            .unwrap();

        let fetched = leads.fetch_all().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, created.id);
    }

    #[tokio::test]
    async fn fetch_hits_cache_until_invalidated() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store.clone());

        leads.fetch_all().await.unwrap();
        leads.fetch_all().await.unwrap();
        assert_eq!(store.list_call_count(), 1);

        leads
            .create(&Lead::new("Acme", "Jo", "jo@acme.com", "Website"))
            .await
            .unwrap();
        leads.fetch_all().await.unwrap();
        assert_eq!(store.list_call_count(), 2);
    }

    #[tokio::test]
    async fn update_touches_only_supplied_fields() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        let created = leads
            .create(&Lead::new("Acme", "Jo", "jo@acme.com", "Website").with_assigned_to("u1"))
            .await
            .unwrap();

        let patch = LeadPatch {
            status: Some(LeadStatus::Contacted),
            ..Default::default()
        };
        leads.update(&created.id, &patch).await.unwrap();

        let after = leads.get(&created.id).await.unwrap().unwrap();
        assert_eq!(after.status, LeadStatus::Contacted);
        assert_eq!(after.assigned_to.as_deref(), Some("u1"));
        assert!(after.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        let patch = LeadPatch {
            notes: Some("x".into()),
            ..Default::default()
        };
        let err = leads.update("nope", &patch).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_before_any_remote_call() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        let err = leads.update("any", &LeadPatch::default()).await.unwrap_err();
        assert!(matches!(err, PkError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn delete_twice_succeeds_and_leaves_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store);

        let created = leads
            .create(&Lead::new("Acme", "Jo", "jo@acme.com", "Website"))
            .await
            .unwrap();

        leads.delete(&created.id).await.unwrap();
        leads.delete(&created.id).await.unwrap();
        assert!(leads.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_unmodified() {
        let store = Arc::new(MemoryDocumentStore::new());
        let leads = client::<Lead>(store.clone());

        leads
            .create(&Lead::new("Acme", "Jo", "jo@acme.com", "Website"))
            .await
            .unwrap();
        let before = leads.fetch_all().await.unwrap();
        let calls_before = store.list_call_count();

        store.fail_next_set();
        let err = leads
            .create(&Lead::new("Beta", "Al", "al@beta.com", "Referral"))
            .await
            .unwrap_err();
        assert!(matches!(err, PkError::Unavailable(_)));

        // The cached scope was not invalidated: no re-fetch happens.
        let after = leads.fetch_all().await.unwrap();
        assert_eq!(store.list_call_count(), calls_before);
        assert_eq!(after.len(), before.len());
    }

    /// Wraps a store and delays `list` so that two fetches of one scope are
    /// reliably in flight together.
    struct SlowStore {
        inner: Arc<MemoryDocumentStore>,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn allocate_id(&self, collection: Collection) -> PkResult<String> {
            self.inner.allocate_id(collection).await
        }

        async fn get(&self, collection: Collection, id: &str) -> PkResult<Option<Document>> {
            self.inner.get(collection, id).await
        }

        async fn list(
            &self,
            collection: Collection,
            filter: &Filter,
            order: Option<OrderBy>,
        ) -> PkResult<Vec<Document>> {
            tokio::time::sleep(self.delay).await;
            self.inner.list(collection, filter, order).await
        }

        async fn set(
            &self,
            collection: Collection,
            id: &str,
            doc: Document,
        ) -> PkResult<Document> {
            self.inner.set(collection, id, doc).await
        }

        async fn update(
            &self,
            collection: Collection,
            id: &str,
            patch: Document,
        ) -> PkResult<DateTime<Utc>> {
            self.inner.update(collection, id, patch).await
        }

        async fn delete(&self, collection: Collection, id: &str) -> PkResult<()> {
            self.inner.delete(collection, id).await
        }
    }

    #[tokio::test]
    async fn concurrent_fetches_of_one_scope_share_a_single_remote_call() {
        let inner = Arc::new(MemoryDocumentStore::new());
        let slow = Arc::new(SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(30),
        });
        let leads: CollectionClient<Lead> =
            CollectionClient::new(slow, Arc::new(SessionCache::new()));

        let a = leads.clone();
        let b = leads.clone();
        let (ra, rb) = tokio::join!(a.fetch_all(), b.fetch_all());
        ra.unwrap();
        rb.unwrap();

        assert_eq!(inner.list_call_count(), 1);
    }
}
