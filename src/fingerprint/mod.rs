//! File fingerprinting and change detection
//!
//! Tracks a content fingerprint per analyzable file and derives a
//! change-set against the previously persisted index. Fingerprints are
//! content hashes, so changes are detected independently of modification
//! timestamps.

mod index;
mod scanner;

pub use index::{load_index, persist_index, ChangeSet, FileIndex, FileRecord};
pub use scanner::{scan, FileEnumerator, ScanOutcome, WalkEnumerator};

pub(crate) use index::unix_timestamp;
