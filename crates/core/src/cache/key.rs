//! Cache key namespacing and content-addressed upload keys.

use sha2::{Digest, Sha256};

/// Prefix applied to every logical key before it reaches the store.
pub const KEY_PREFIX: &str = "bg_cache_";

/// Prefix for keys derived from uploaded image content.
pub const UPLOAD_PREFIX: &str = "custom_";

/// Namespace a logical background key for storage.
pub fn namespaced(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// Compute a stable key for uploaded image bytes.
///
/// Identical uploads map to the same key, so re-uploading overwrites
/// rather than accumulating copies.
pub fn upload_key(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{UPLOAD_PREFIX}{}", &hex::encode(digest)[..16])
}
