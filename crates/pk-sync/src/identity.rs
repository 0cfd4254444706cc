//! Current-user resolution.
//!
//! The signed-in user's profile record gates privileged operations (the
//! skill vocabulary, admin-only views). It is read often and changes rarely,
//! so it is cached with a short time-based expiry rather than participating
//! in collection-wide invalidation: role changes made elsewhere become
//! visible within the TTL without any explicit refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use pk_core::{wire, AuthProvider, Collection, DocumentStore, PkResult, User};

struct CachedUser {
    uid: String,
    // None is cached too: a uid without a profile record stays "not found"
    // until the TTL elapses, instead of hammering the store on every check.
    user: Option<User>,
    fetched_at: Instant,
}

pub struct UserDirectory {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
    cached: RwLock<Option<CachedUser>>,
}

impl UserDirectory {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            auth,
            store,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// The profile record of the signed-in user, or `None` when nobody is
    /// signed in or no profile record exists for the uid.
    pub async fn current_user(&self) -> PkResult<Option<User>> {
        let uid = match self.auth.current_uid().await? {
            Some(uid) => uid,
            None => return Ok(None),
        };

        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.uid == uid && entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.user.clone());
                }
            }
        }

        let user = match self.store.get(Collection::Users, &uid).await? {
            Some(doc) => Some(wire::decode::<User>(doc)?),
            None => None,
        };
        debug!(uid, found = user.is_some(), "current user resolved");

        let mut cached = self.cached.write().await;
        *cached = Some(CachedUser {
            uid,
            user: user.clone(),
            fetched_at: Instant::now(),
        });
        Ok(user)
    }

    /// Whether the signed-in user holds the admin role.
    pub async fn is_admin(&self) -> PkResult<bool> {
        Ok(self
            .current_user()
            .await?
            .map(|user| user.is_admin())
            .unwrap_or(false))
    }

    /// Drop the cached profile so the next lookup goes to the store.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
