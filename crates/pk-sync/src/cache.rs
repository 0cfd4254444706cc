//! Session-scoped query cache.
//!
//! One cache instance is shared by every consumer of a session; there is no
//! process-wide singleton. Entries are keyed by scope: a collection plus the
//! canonical signature of the list filter. Invalidation is coarse (all scopes
//! of a collection go stale together) and lazy: stale scopes are re-fetched
//! on next access, never eagerly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use pk_core::{Collection, Document, Filter};

/// Identifies one cached query result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    collection: Collection,
    signature: String,
}

impl ScopeKey {
    pub fn new(collection: Collection, filter: &Filter) -> Self {
        Self {
            collection,
            signature: filter.signature(),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

struct CachedScope {
    docs: Arc<Vec<Document>>,
    stale: bool,
    expires_at: Option<Instant>,
}

impl CachedScope {
    fn is_valid(&self) -> bool {
        if self.stale {
            return false;
        }
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// Shared cache context for one application session.
#[derive(Default)]
pub struct SessionCache {
    scopes: RwLock<HashMap<ScopeKey, CachedScope>>,
    // One lock per scope so concurrent cache misses share a single remote
    // fetch. Entries are retained for the session; scope cardinality is small.
    fetch_locks: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached result for a scope, if present and still valid.
    pub async fn get(&self, key: &ScopeKey) -> Option<Arc<Vec<Document>>> {
        let scopes = self.scopes.read().await;
        scopes
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.docs.clone())
    }

    /// Replace the cached result for a scope.
    pub async fn put(&self, key: ScopeKey, docs: Vec<Document>) {
        self.put_entry(key, docs, None).await;
    }

    /// Replace the cached result for a scope with a time-based expiry.
    /// Collection scopes normally stay valid until explicitly invalidated;
    /// an expiry is for data whose writers bypass this cache entirely.
    pub async fn put_with_ttl(&self, key: ScopeKey, docs: Vec<Document>, ttl: Duration) {
        self.put_entry(key, docs, Some(Instant::now() + ttl)).await;
    }

    async fn put_entry(&self, key: ScopeKey, docs: Vec<Document>, expires_at: Option<Instant>) {
        let mut scopes = self.scopes.write().await;
        scopes.insert(
            key,
            CachedScope {
                docs: Arc::new(docs),
                stale: false,
                expires_at,
            },
        );
    }

    /// Mark every scope of a collection stale. A mutation anywhere in a
    /// collection may change which filters its records match, so scope-precise
    /// invalidation is not attempted.
    pub async fn invalidate_collection(&self, collection: Collection) {
        let mut scopes = self.scopes.write().await;
        let mut invalidated = 0usize;
        for (key, entry) in scopes.iter_mut() {
            if key.collection == collection && !entry.stale {
                entry.stale = true;
                invalidated += 1;
            }
        }
        debug!(collection = %collection, scopes = invalidated, "collection invalidated");
    }

    /// The per-scope fetch lock. A caller that misses the cache acquires this
    /// before issuing the remote list call and re-checks the cache after
    /// acquisition, so racing callers share one fetch.
    pub async fn fetch_lock(&self, key: &ScopeKey) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Number of scopes currently held (valid or stale).
    pub async fn scope_count(&self) -> usize {
        self.scopes.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), json!(id));
        d
    }

    #[tokio::test]
    async fn put_then_get_returns_cached_docs() {
        let cache = SessionCache::new();
        let key = ScopeKey::new(Collection::Leads, &Filter::none());

        cache.put(key.clone(), vec![doc("l1")]).await;
        let docs = cache.get(&key).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn distinct_filters_are_distinct_scopes() {
        let cache = SessionCache::new();
        let all = ScopeKey::new(Collection::Candidates, &Filter::none());
        let scoped = ScopeKey::new(
            Collection::Candidates,
            &Filter::none().eq("opportunityId", "OPP1"),
        );

        cache.put(all.clone(), vec![doc("c1"), doc("c2")]).await;
        cache.put(scoped.clone(), vec![doc("c1")]).await;

        assert_eq!(cache.get(&all).await.unwrap().len(), 2);
        assert_eq!(cache.get(&scoped).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalidation_is_collection_wide() {
        let cache = SessionCache::new();
        let all = ScopeKey::new(Collection::Candidates, &Filter::none());
        let scoped = ScopeKey::new(
            Collection::Candidates,
            &Filter::none().eq("opportunityId", "OPP1"),
        );
        let other = ScopeKey::new(Collection::Leads, &Filter::none());

        cache.put(all.clone(), vec![doc("c1")]).await;
        cache.put(scoped.clone(), vec![doc("c1")]).await;
        cache.put(other.clone(), vec![doc("l1")]).await;

        cache.invalidate_collection(Collection::Candidates).await;

        assert!(cache.get(&all).await.is_none());
        assert!(cache.get(&scoped).await.is_none());
        // Other collections are untouched.
        assert!(cache.get(&other).await.is_some());
    }

    #[tokio::test]
    async fn ttl_expires_an_entry() {
        let cache = SessionCache::new();
        let key = ScopeKey::new(Collection::Users, &Filter::none().eq("id", "me"));

        cache
            .put_with_ttl(key.clone(), vec![doc("u1")], Duration::from_millis(20))
            .await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn fetch_lock_is_shared_per_scope() {
        let cache = SessionCache::new();
        let key = ScopeKey::new(Collection::Leads, &Filter::none());

        let a = cache.fetch_lock(&key).await;
        let b = cache.fetch_lock(&key).await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = ScopeKey::new(Collection::Teams, &Filter::none());
        let c = cache.fetch_lock(&other).await;
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
