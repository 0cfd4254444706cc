pub mod auth;
pub mod memory;

pub use auth::FixedAuthProvider;
pub use memory::{MemoryBlobStore, MemoryDocumentStore};
