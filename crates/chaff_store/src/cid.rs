// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Content identifiers.

use std::fmt;
use std::sync::Arc;

/// A content identifier assigned by a blob store.
///
/// Cids are opaque to the core: they are compared, ordered, and hashed but
/// never parsed. The only structural requirement is the length bound of
/// [`Cid::MAX_LEN`] bytes, enforced where cids cross a deserialization
/// boundary.
///
/// Cloning is cheap; the identifier text is reference-counted.
///
/// # Examples
///
/// ```
/// use chaff_store::Cid;
///
/// let cid = Cid::from("bafy-example");
/// assert_eq!(cid.as_str(), "bafy-example");
/// assert_eq!(cid.to_string(), "bafy-example");
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid(Arc<str>);

impl Cid {
    /// The maximum length of a cid in bytes.
    ///
    /// Identifiers longer than this are rejected when decoded from the wire.
    pub const MAX_LEN: usize = 256;

    /// Creates a cid from its textual form.
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Returns the textual form of the cid.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length of the textual form in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the textual form is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", &self.0)
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Cid {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Cid {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Cid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Cid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.len() > Self::MAX_LEN {
            return Err(serde::de::Error::custom("cid exceeds maximum length"));
        }
        Ok(Self::new(text))
    }
}

/// Computes the canonical content identifier for a byte sequence.
///
/// This is the addressing scheme of the bundled in-memory store: lowercase
/// hex of the BLAKE3 hash of the bytes, with no domain prefix. Identical
/// bytes always yield the identical cid.
///
/// External stores are free to use any other scheme; the core never assumes
/// this one except where it explicitly verifies bytes against a cid it
/// produced itself.
///
/// # Examples
///
/// ```
/// use chaff_store::content_id;
///
/// let a = content_id(b"same bytes");
/// let b = content_id(b"same bytes");
/// assert_eq!(a, b);
/// assert_ne!(a, content_id(b"other bytes"));
/// ```
#[must_use]
pub fn content_id(bytes: &[u8]) -> Cid {
    Cid::new(blake3::hash(bytes).to_hex().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_is_deterministic() {
        assert_eq!(content_id(b"abc"), content_id(b"abc"));
        assert_ne!(content_id(b"abc"), content_id(b"abd"));
    }

    #[test]
    fn content_id_is_hex_of_fixed_width() {
        let cid = content_id(&[0u8; 64]);
        assert_eq!(cid.len(), 64);
        assert!(cid.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cids_order_lexicographically() {
        let mut cids = vec![Cid::from("b"), Cid::from("a"), Cid::from("c")];
        cids.sort();
        assert_eq!(cids, vec![Cid::from("a"), Cid::from("b"), Cid::from("c")]);
    }
}
