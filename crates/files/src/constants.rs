/// Digest algorithm used for content identifiers.
pub const HASH_ALGORITHM: &str = "sha256";

/// Directory under the store root that holds SHA-256 addressed content.
pub const SHA256_DIR_NAME: &str = "sha256";
