use sha2::{Digest, Sha256};

/// Algorithm prefix used for all content digests.
pub const SHA256_PREFIX: &str = "sha256:";

/// Computes the hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes an OCI-style content digest (`sha256:<hex>`) of `data`.
///
/// # Example
///
/// ```
/// use up_utils::hash::sha256_digest;
///
/// assert_eq!(
///     sha256_digest(b""),
///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{SHA256_PREFIX}{}", sha256_hex(data))
}

/// Returns true if `data` hashes to `expected`, compared case-insensitively.
pub fn verify_digest(data: &[u8], expected: &str) -> bool {
    sha256_digest(data).eq_ignore_ascii_case(expected)
}

/// Returns true if `value` looks like `sha256:` followed by 64 hex characters.
pub fn is_sha256_digest(value: &str) -> bool {
    value
        .strip_prefix(SHA256_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
