//! Persistence: content-addressed blobs and snapshot version history.

pub mod blob;
pub mod snapshot;

pub use blob::{BlobStore, content_hash};
pub use snapshot::{SnapshotIndex, VersionMeta};
