// Infrastructure - External-collaborator seams and their bundled implementations

pub mod blob_store;     // Blob upload seam + in-memory implementation
pub mod cache;          // Shared LRU cache
pub mod document_store; // DocumentStore trait and query/update types
pub mod identity;       // Identity-provider seam
pub mod memory_store;   // In-process store (tests, demos, change streams)
pub mod sqlite_store;   // SQLite-backed store

pub use blob_store::{BlobStore, MemoryBlobStore};
pub use cache::SharedCache;
pub use document_store::{
    collections, composite_id, ChangeEvent, ChangeStream, Direction, Document, DocumentStore,
    FieldDelta, Fields, Filter, OrderBy,
};
pub use identity::{IdentityProvider, StaticIdentity};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
