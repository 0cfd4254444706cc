//! Auth provider backed by a fixed, swappable uid. Stands in for the real
//! authentication service in tests and local sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use pk_core::{AuthProvider, PkResult};

pub struct FixedAuthProvider {
    uid: RwLock<Option<String>>,
}

impl FixedAuthProvider {
    /// A provider with a signed-in user.
    pub fn signed_in(uid: impl Into<String>) -> Self {
        Self {
            uid: RwLock::new(Some(uid.into())),
        }
    }

    /// A provider with no signed-in user.
    pub fn signed_out() -> Self {
        Self {
            uid: RwLock::new(None),
        }
    }

    /// Swap the signed-in user mid-session.
    pub async fn set_uid(&self, uid: Option<String>) {
        *self.uid.write().await = uid;
    }
}

#[async_trait]
impl AuthProvider for FixedAuthProvider {
    async fn current_uid(&self) -> PkResult<Option<String>> {
        Ok(self.uid.read().await.clone())
    }
}
