pub mod associations;
pub mod attachments;
pub mod cache;
pub mod client;
pub mod collection;
pub mod config;
pub mod identity;
pub mod vocabulary;

pub use associations::AssociationResolver;
pub use attachments::{AttachmentLifecycle, FileSource};
pub use cache::{ScopeKey, SessionCache};
pub use client::PipekitClient;
pub use collection::CollectionClient;
pub use config::SyncConfig;
pub use identity::UserDirectory;
pub use vocabulary::SkillVocabulary;
