//! snapvault-catalog: which backups exist, and which may go
//!
//! Storage object names are the only index. A listing of the bucket is parsed
//! with a [`NamingConvention`], folded into a [`BackupCatalog`] keyed by
//! backup timestamp, and a [`RetentionPolicy`] selects entries to delete while
//! always keeping a minimum number of restorable backups.
//!
//! Everything here is pure: build a catalog from a fresh listing for every
//! operation and throw it away afterwards.

pub mod catalog;
pub mod error;
pub mod naming;
pub mod retention;

pub use catalog::{BackupCatalog, BackupEntry};
pub use error::{CatalogError, CatalogResult};
pub use naming::{NamingConvention, ObjectInfo, ObjectKind, DEFAULT_PREFIX};
pub use retention::{deletable, RetentionPolicy};
