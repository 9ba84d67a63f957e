//! snapvault-storage: backups as objects in an S3-compatible bucket
//!
//! Every operation lists the bucket, rebuilds the catalog from object names and
//! acts on it. Encryption and decryption run on blocking threads, bridged to
//! OpenDAL's async readers and writers.

pub mod backup;
pub mod bridge;
pub mod listing;
pub mod operator;
pub mod prune;
pub mod restore;
pub mod rotate;

pub use backup::{upload_backup, BackupReport};
pub use bridge::ProgressFn;
pub use listing::{list_object_names, load_catalog};
pub use operator::build_operator;
pub use prune::prune_backups;
pub use restore::{download_backup, RestoreReport};
pub use rotate::{rotate_keys, RotationReport};
