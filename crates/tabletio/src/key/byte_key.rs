use bytes::Bytes;
use core::fmt;

/// An immutable row key ordered lexicographically over unsigned bytes.
///
/// The empty key is a sentinel: as a start bound it means the beginning of the
/// keyspace, as an end bound it means the end of the keyspace. Because the
/// empty sequence is the smallest possible value under lexicographic order,
/// the start-bound meaning falls out of the derived [`Ord`]; end bounds must be
/// special-cased by the caller (see [`KeyRange`]).
///
/// Cloning is cheap: the bytes are reference counted.
///
/// # Example
/// ```
/// use tabletio::ByteKey;
///
/// let a = ByteKey::from("a");
/// let b = ByteKey::from(vec![0x61, 0x00]);
/// assert!(ByteKey::EMPTY < a);
/// assert!(a < b);
/// assert_eq!(b.to_string(), "a\\x00");
/// ```
///
/// [`KeyRange`]: crate::KeyRange
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ByteKey(Bytes);

impl ByteKey {
    /// The open bound.
    pub const EMPTY: Self = Self(Bytes::new());

    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for ByteKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for ByteKey {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ByteKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for ByteKey {
    fn from(bytes: &[u8]) -> Self {
        Self::copy_from_slice(bytes)
    }
}

impl From<&str> for ByteKey {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl From<String> for ByteKey {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

// Printable ASCII is shown as-is, everything else as `\xNN`.
impl fmt::Display for ByteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if (b.is_ascii_graphic() && b != b'\\') || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ByteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}
