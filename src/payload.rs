//! Payload value exchanged by every interaction.
//!
//! A payload is an opaque pair of byte blobs: the data and an
//! optional metadata section.  The engine never looks inside either
//! part.  Payloads are immutable once built; cloning is cheap
//! because both parts sit behind an `Arc`.

use std::fmt;
use std::sync::Arc;

/// Data plus optional metadata.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Arc<[u8]>,
    metadata: Option<Arc<[u8]>>,
}

impl Payload {
    /// Create a payload with data and optional metadata.
    pub fn new(data: impl Into<Vec<u8>>, metadata: Option<Vec<u8>>) -> Self {
        Self {
            data: data.into().into(),
            metadata: metadata.map(Into::into),
        }
    }

    /// Create a payload carrying only data.
    pub fn from_data(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, None)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Data interpreted as UTF‑8, replacing invalid sequences.
    pub fn data_utf8(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::from_data(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::from_data(s.into_bytes())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("data", &String::from_utf8_lossy(&self.data))
            .field("metadata_len", &self.metadata.as_ref().map(|m| m.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_optional() {
        let plain = Payload::from("hello");
        assert_eq!(plain.data(), b"hello");
        assert!(plain.metadata().is_none());

        let with_meta = Payload::new(b"x".to_vec(), Some(b"route".to_vec()));
        assert_eq!(with_meta.metadata(), Some(&b"route"[..]));
    }

    #[test]
    fn clones_share_content() {
        let a = Payload::from("shared");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.data_utf8(), "shared");
    }
}
