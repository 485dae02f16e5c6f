//! # Identity Hasher
//!
//! Salted SHA-256 pseudonyms for device identifiers.
//!
//! Device-identifying strings never leave the device in recoverable form, but
//! the pseudonym stays stable across runs so the collector can group samples
//! per device.
//!
//! **Digest**: SHA-256 over `salt ++ identity`
//! **Rendering**: lowercase hexadecimal (64 characters)

use sha2::{Digest, Sha256};

/// Salt used when none is configured
pub const DEFAULT_SALT: &str = "android-salt";

/// Hash an identity string with the given salt
///
/// # Arguments
///
/// * `identity` - Raw device identifier (any string is valid)
/// * `salt` - Salt prepended before hashing
///
/// # Returns
///
/// * `String` - 64-character lowercase hex digest
///
/// # Examples
///
/// ```
/// use cellprobe::identity::hash;
///
/// let a = hash("Google-Pixel 8", "android-salt");
/// let b = hash("Google-Pixel 8", "android-salt");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn hash(identity: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hasher bound to one salt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHasher {
    salt: String,
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(DEFAULT_SALT)
    }
}

impl IdentityHasher {
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Returns the configured salt.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Pseudonym for `identity` under this hasher's salt.
    #[must_use]
    pub fn pseudonym(&self, identity: &str) -> String {
        hash(identity, &self.salt)
    }
}
