//! Common types used across storage operations.

use std::ops::Range;

use bytes::Bytes;

/// Key-value pair returned from range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Returns the key range covering every key that starts with `prefix`.
///
/// The upper bound is the prefix with its last byte incremented, which
/// is exclusive-correct for byte-ordered keys. A prefix ending in `0xff`
/// (or an empty prefix) yields an unbounded-style sentinel by extending
/// the prefix, which no real key in this system uses.
///
/// # Examples
///
/// ```
/// use sudogate_storage::prefix_range;
///
/// let range = prefix_range(b"grant/");
/// assert_eq!(range.start, b"grant/".to_vec());
/// assert_eq!(range.end, b"grant0".to_vec());
/// ```
pub fn prefix_range(prefix: &[u8]) -> Range<Vec<u8>> {
    let start = prefix.to_vec();
    let mut end = prefix.to_vec();
    loop {
        match end.pop() {
            Some(byte) if byte < u8::MAX => {
                end.push(byte + 1);
                break;
            },
            Some(_) => continue,
            None => {
                // Prefix was all 0xff (or empty): fall back to a bound
                // above any key this system generates.
                end = prefix.to_vec();
                end.extend_from_slice(&[u8::MAX; 8]);
                break;
            },
        }
    }
    start..end
}

/// Macro to define a newtype wrapper around `i64` with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64` (zero runtime cost)
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<i64>` and `Into<i64>`
/// - Implements `Display` that outputs the inner value
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier for an identity in the directory.
    ///
    /// The value `0` is reserved for the system actor in audit records;
    /// directories assign real identities ids starting at `1`. Wrapping
    /// the raw `i64` prevents accidentally passing some other counter
    /// where an identity id is expected.
    ///
    /// # Examples
    ///
    /// ```
    /// use sudogate_storage::IdentityId;
    ///
    /// let id = IdentityId::from(42);
    /// assert_eq!(i64::from(id), 42);
    /// assert_eq!(id.to_string(), "42");
    /// ```
    IdentityId
);

impl IdentityId {
    /// The reserved actor id for actions taken by the system itself.
    pub const SYSTEM: IdentityId = IdentityId(0);
}
