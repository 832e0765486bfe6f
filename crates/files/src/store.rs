//! Content-addressed storage service implementation
//!
//! Stores uploaded record bytes under their SHA-256 digest. The ledger keeps only the
//! returned identifier, so the bytes can be backed up, moved or served independently
//! of the ledger state.
//!
//! # Content Addressing
//!
//! - **Deduplication**: identical bytes are stored once and yield the same identifier
//! - **Integrity**: reads are verified against the identifier before returning
//! - **Immutability**: existing content is never overwritten
//! - **Deterministic paths**: the same content always lands at the same path

use crate::{ContentHash, FilesError, HASH_ALGORITHM, SHA256_DIR_NAME};
use chrono::{DateTime, Utc};
use medrec_types::NonEmptyText;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Metadata describing one stored piece of content.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoredContent {
    /// Hashing algorithm used (always "sha256")
    pub hash_algorithm: NonEmptyText,

    /// Content identifier
    pub hash: ContentHash,

    /// Path relative to the store root where the bytes live
    pub relative_path: NonEmptyText,

    /// Size of the content in bytes
    pub size_bytes: u64,

    /// Detected media type, if any.
    ///
    /// Best-effort only; `None` when the bytes carry no recognisable signature.
    pub media_type: Option<NonEmptyText>,

    /// When the content was first written to this store
    pub stored_at: DateTime<Utc>,
}

/// Service for storing and retrieving content by hash.
///
/// The service is cheap to clone; it only carries the canonicalised root directory.
#[derive(Debug, Clone)]
pub struct ContentStoreService {
    root_directory: PathBuf,
}

impl ContentStoreService {
    /// Opens (creating if necessary) a content store rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root exists but is not a
    /// directory, cannot be created, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if root_directory.exists() && !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        fs::create_dir_all(root_directory).map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot create {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Stores `bytes` and returns their metadata.
    ///
    /// Storing bytes that are already present is not an error: the existing copy is kept
    /// and the same identifier is returned.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the shard directories or the content file cannot be
    /// written, or `FilesError::IntegrityMismatch` if an existing file under the same
    /// identifier holds different bytes.
    pub fn put(&self, bytes: &[u8]) -> Result<StoredContent, FilesError> {
        let hash = ContentHash::of(bytes);
        let storage_path = self.storage_path(&hash);

        if storage_path.exists() {
            let existing = fs::read(&storage_path)?;
            if ContentHash::of(&existing) != hash {
                return Err(FilesError::IntegrityMismatch(hash.to_string()));
            }
        } else {
            let parent = storage_path.parent().unwrap_or(&self.root_directory);
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;

            // Each writer stages into its own file beside the target, so a crash never
            // leaves a partial file under a valid identifier and concurrent puts of the
            // same bytes do not share a staging path.
            let mut staging = NamedTempFile::new_in(parent)?;
            staging.write_all(bytes)?;
            staging.as_file().sync_all()?;
            if let Err(e) = staging.persist(&storage_path) {
                if !storage_path.is_file() {
                    return Err(FilesError::Io(e.error));
                }
            }
        }

        let stored_at = fs::metadata(&storage_path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredContent {
            hash_algorithm: NonEmptyText::new(HASH_ALGORITHM)
                .map_err(|_| FilesError::InvalidHash(HASH_ALGORITHM.into()))?,
            relative_path: self.relative_path(&hash)?,
            size_bytes: bytes.len() as u64,
            media_type: infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok()),
            hash,
            stored_at,
        })
    }

    /// Reads the content stored under `hash`, verifying its integrity.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::NotFound` if nothing is stored under `hash`,
    /// `FilesError::IntegrityMismatch` if the stored bytes do not hash to `hash`,
    /// or `FilesError::Io` on read failure.
    pub fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.storage_path(hash);
        if !storage_path.is_file() {
            return Err(FilesError::NotFound(hash.to_string()));
        }

        let bytes = fs::read(&storage_path)?;
        if &ContentHash::of(&bytes) != hash {
            return Err(FilesError::IntegrityMismatch(hash.to_string()));
        }
        Ok(bytes)
    }

    /// Returns true if content is stored under `hash`.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.storage_path(hash).is_file()
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Absolute path for `hash`: `<root>/sha256/<h[0..2]>/<h[2..4]>/<h>`.
    fn storage_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.as_str();
        self.root_directory
            .join(SHA256_DIR_NAME)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }

    fn relative_path(&self, hash: &ContentHash) -> Result<NonEmptyText, FilesError> {
        let hex = hash.as_str();
        NonEmptyText::new(format!(
            "{}/{}/{}/{}",
            SHA256_DIR_NAME,
            &hex[0..2],
            &hex[2..4],
            hex
        ))
        .map_err(|_| FilesError::InvalidHash(hex.to_owned()))
    }
}
