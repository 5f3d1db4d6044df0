//! Record keys.
//!
//! Server records are identified by numeric ids, string slugs or UUIDs depending
//! on the endpoint. Push events carry the same ids as JSON numbers or strings.
//! [`Key`] normalizes all of them to a string so `42` and `"42"` compare equal.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Normalized logical identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from anything string-like.
    pub fn new(raw: impl Into<String>) -> Self {
        Key(raw.into())
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key(value.to_string())
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Key(value.clone())
    }
}

impl From<Uuid> for Key {
    fn from(value: Uuid) -> Self {
        Key(value.to_string())
    }
}

macro_rules! key_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Key(value.to_string())
                }
            }
        )*
    };
}

key_from_int!(i32, i64, u32, u64, usize);

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawKey {
            Int(i64),
            UInt(u64),
            Str(String),
        }

        Ok(match RawKey::deserialize(deserializer)? {
            RawKey::Int(v) => Key::from(v),
            RawKey::UInt(v) => Key::from(v),
            RawKey::Str(v) => Key(v),
        })
    }
}

/// Collect anything key-like into a `Vec<Key>`.
///
/// ```ignore
/// store.mark_dirty(keys([1, 2, 3]));
/// ```
pub fn keys<I, K>(ids: I) -> Vec<Key>
where
    I: IntoIterator<Item = K>,
    K: Into<Key>,
{
    ids.into_iter().map(Into::into).collect()
}

/// A server-owned record that can report its own key.
pub trait Record: Clone + Send + Sync + 'static {
    /// The record's logical identifier.
    fn key(&self) -> Key;
}
