//! The unit exchanged by push and pop.

use std::fmt;

use bytes::Bytes;

use crate::error::PayloadError;

/// Largest payload the 7-bit header length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 127;

/// An immutable byte sequence of 0 to [`MAX_PAYLOAD_LEN`] bytes.
///
/// Backed by [`Bytes`], so clones are reference-counted and never copy the
/// underlying buffer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Bytes);

impl Payload {
    /// Build a payload, rejecting anything longer than [`MAX_PAYLOAD_LEN`].
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, PayloadError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadError::TooLarge {
                len: bytes.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self(bytes))
    }

    /// Copy a slice into a new payload.
    pub fn copy_from_slice(data: &[u8]) -> Result<Self, PayloadError> {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Payload taken from a decoded request. The 7-bit length field already
    /// bounds it.
    pub(crate) fn from_wire(data: &[u8]) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD_LEN);
        Self(Bytes::copy_from_slice(data))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for Payload {
    type Error = PayloadError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&'static [u8]> for Payload {
    type Error = PayloadError;

    fn try_from(value: &'static [u8]) -> Result<Self, Self::Error> {
        Self::new(Bytes::from_static(value))
    }
}

// Hex keeps log lines readable for binary payloads.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload(")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_max_length() {
        let payload = Payload::new(vec![0xAB; MAX_PAYLOAD_LEN]).unwrap();
        assert_eq!(payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_rejects_oversized() {
        let err = Payload::new(vec![0; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(
            err,
            PayloadError::TooLarge {
                len: 128,
                max: MAX_PAYLOAD_LEN
            }
        );
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let payload = Payload::default();
        assert!(payload.is_empty());
        assert_eq!(payload.as_bytes(), b"");
    }

    #[test]
    fn test_debug_is_hex() {
        let payload = Payload::copy_from_slice(&[0xAA, 0xBB]).unwrap();
        assert_eq!(format!("{payload:?}"), "Payload(aabb)");
    }
}
