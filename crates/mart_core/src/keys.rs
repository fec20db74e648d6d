//! Surrogate key generation.
//!
//! Surrogate keys are content-derived: the same natural-key tuple always
//! produces the same key, on every run and every platform. Each tuple element
//! is rendered through [`Value::canonical`], length-prefixed, and joined, so
//! `("a-b", "c")` and `("a", "b-c")` hash differently. Null elements use a
//! fixed token that cannot collide with any length-prefixed element.
//!
//! The reserved default member key (`"-1"`) is never a hash output: hash
//! outputs are always 32 lower-case hexadecimal characters.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::Value;

/// Sentinel key of every dimension's default ("unknown") member.
pub const DEFAULT_MEMBER_KEY: &str = "-1";

/// Token substituted for null tuple elements.
pub const NULL_TOKEN: &str = "_null_";

/// Separator between encoded tuple elements.
const SEPARATOR: &str = "|";

/// Number of digest bytes kept (rendered as twice as many hex characters).
const KEY_BYTES: usize = 16;

/// A stable, content-derived identifier for a dimension member, fact, or
/// history version.
///
/// # Examples
///
/// ```
/// use mart_core::keys::SurrogateKey;
/// use mart_core::types::Value;
///
/// let a = SurrogateKey::generate(&[Value::from("T1")]);
/// let b = SurrogateKey::generate(&[Value::from("T1")]);
/// assert_eq!(a, b);
///
/// let unknown = SurrogateKey::default_member();
/// assert!(unknown.is_default_member());
/// assert_ne!(a, unknown);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(String);

impl SurrogateKey {
    /// Hashes an ordered natural-key tuple.
    ///
    /// The arity of `parts` is fixed by the caller's model definition; a
    /// mismatch is a programming error, not a runtime condition.
    pub fn generate(parts: &[Value]) -> Self {
        let encoded = parts
            .iter()
            .map(|part| match part.canonical() {
                Some(s) => format!("{}:{}", s.len(), s),
                None => NULL_TOKEN.to_string(),
            })
            .collect::<Vec<_>>()
            .join(SEPARATOR);

        let digest = Sha256::digest(encoded.as_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    /// The reserved key of the default member.
    #[inline]
    pub fn default_member() -> Self {
        Self(DEFAULT_MEMBER_KEY.to_string())
    }

    /// Returns `true` for the reserved default member key.
    #[inline]
    pub fn is_default_member(&self) -> bool {
        self.0 == DEFAULT_MEMBER_KEY
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds a key from a stored column value.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(|s| Self(s.to_string()))
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SurrogateKey> for Value {
    fn from(key: SurrogateKey) -> Self {
        Value::Text(key.0)
    }
}

impl From<&SurrogateKey> for Value {
    fn from(key: &SurrogateKey) -> Self {
        Value::Text(key.0.clone())
    }
}
