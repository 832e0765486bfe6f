//! Local content-addressed storage for medical record uploads.
//!
//! Record bytes never travel through the ledger. The ledger only holds a content
//! identifier, and the bytes live in a content-addressed store where they are retrieved
//! by the hash of their content.
//!
//! ## Design Principles
//!
//! - Content is identified by its SHA-256 digest (64 lowercase hex characters)
//! - Stored content is immutable; storing identical bytes again yields the same identifier
//! - Reads verify the bytes against their identifier before returning them
//! - Media type detection is best-effort and never authoritative
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! └── sha256/
//!     └── ab/
//!         └── 3f/
//!             └── ab3f9e…
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use medrec_files::ContentStoreService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStoreService::new(Path::new("content_store"))?;
//! let stored = store.put(b"scan results")?;
//! let bytes = store.get(&stored.hash)?;
//! assert_eq!(bytes, b"scan results");
//! # Ok(())
//! # }
//! ```

mod constants;
mod hash;
mod store;

pub use constants::{HASH_ALGORITHM, SHA256_DIR_NAME};
pub use hash::ContentHash;
pub use store::{ContentStoreService, StoredContent};

/// Errors that can occur during content store operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory could not be created or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// A content identifier was not a 64-character lowercase hex digest
    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    /// No content is stored under the requested identifier
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Stored bytes no longer match their identifier
    #[error("Content integrity check failed for {0}")]
    IntegrityMismatch(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
