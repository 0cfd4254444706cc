//! Session-level entry point wiring the stores, the shared cache, and the
//! higher-level workflows together. One `PipekitClient` per signed-in
//! session; all facades returned from it share the same cache, so an
//! invalidation triggered through one is observed by all.

use std::sync::Arc;

use pk_core::{
    AuthProvider, BlobStore, Candidate, DocumentStore, Interaction, Lead, Opportunity, Record,
    Skill, Team, User,
};

use crate::associations::AssociationResolver;
use crate::attachments::AttachmentLifecycle;
use crate::cache::SessionCache;
use crate::collection::CollectionClient;
use crate::config::SyncConfig;
use crate::identity::UserDirectory;
use crate::vocabulary::SkillVocabulary;

pub struct PipekitClient {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<SessionCache>,
    identity: Arc<UserDirectory>,
}

impl PipekitClient {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
    ) -> Self {
        let cache = Arc::new(SessionCache::new());
        let identity = Arc::new(UserDirectory::new(
            auth,
            docs.clone(),
            config.current_user_ttl(),
        ));
        Self {
            docs,
            blobs,
            cache,
            identity,
        }
    }

    fn collection<T: Record>(&self) -> CollectionClient<T> {
        CollectionClient::new(self.docs.clone(), self.cache.clone())
    }

    pub fn leads(&self) -> CollectionClient<Lead> {
        self.collection()
    }

    pub fn opportunities(&self) -> CollectionClient<Opportunity> {
        self.collection()
    }

    pub fn candidates(&self) -> CollectionClient<Candidate> {
        self.collection()
    }

    pub fn interactions(&self) -> CollectionClient<Interaction> {
        self.collection()
    }

    pub fn skills(&self) -> CollectionClient<Skill> {
        self.collection()
    }

    pub fn users(&self) -> CollectionClient<User> {
        self.collection()
    }

    pub fn teams(&self) -> CollectionClient<Team> {
        self.collection()
    }

    pub fn attachments(&self) -> AttachmentLifecycle {
        AttachmentLifecycle::new(self.docs.clone(), self.blobs.clone(), self.cache.clone())
    }

    pub fn associations(&self) -> AssociationResolver {
        AssociationResolver::new(self.candidates())
    }

    pub fn vocabulary(&self) -> SkillVocabulary {
        SkillVocabulary::new(self.skills())
    }

    pub fn identity(&self) -> Arc<UserDirectory> {
        self.identity.clone()
    }

    pub fn cache(&self) -> Arc<SessionCache> {
        self.cache.clone()
    }
}
