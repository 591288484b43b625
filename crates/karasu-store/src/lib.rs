//! # Karasu Store
//!
//! Collection-scoped storage for canonical objects, plus the audit-sink and
//! organization-directory collaborators the service layer composes with.
//! The store is a plain in-memory structure; callers that need concurrent
//! access wrap it in their own lock.

pub mod audit;
pub mod collection;
pub mod directory;
pub mod store;

pub use audit::{AuditEntry, AuditOperation, AuditSink, MemoryAuditSink, NullAuditSink};
pub use collection::Collection;
pub use directory::{InMemoryDirectory, Organization, OrganizationDirectory};
pub use store::{ObjectStore, Page, PageResult, QueryFilters, StoreError, StoredObject};
