//! Network credential data structures.
//!
//! Platform-independent credential pair delivered over the provisioning
//! channel and persisted by [`crate::storage::CredentialStore`].

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum stored network name length. One byte of the 32-byte storage
/// region is reserved for the terminator.
pub const MAX_NETWORK_NAME_LEN: usize = 31;

/// Maximum stored secret length. One byte of the 64-byte storage region is
/// reserved for the terminator.
pub const MAX_SECRET_LEN: usize = 63;

/// A network-name/secret pair.
///
/// Both fields are truncated to their storage maxima at construction, so a
/// `Credentials` value always fits the persistent layout. The secret is
/// zeroed on drop and never printed by the `Debug` impl.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    network_name: String,
    secret: String,
}

impl Credentials {
    /// Build a credential pair, truncating oversized fields.
    pub fn new(network_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            network_name: truncate_chars(network_name.into(), MAX_NETWORK_NAME_LEN),
            secret: truncate_chars(secret.into(), MAX_SECRET_LEN),
        }
    }

    /// Credential pair with both fields empty (the unprovisioned state).
    pub fn empty() -> Self {
        Self {
            network_name: String::new(),
            secret: String::new(),
        }
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// True when both fields are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.network_name.is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_name", &self.network_name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Truncate a string to at most `max` bytes without splitting a UTF-8
/// character.
fn truncate_chars(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}
