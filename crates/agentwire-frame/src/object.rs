//! Wire value types carried inside a frame.
//!
//! All three hold their bytes in [`Bytes`], so cloning one out of a decoded
//! frame (for example to re-publish it) shares the buffer instead of copying.

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// One protocol-level key/value attribute of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    key: String,
    value: Bytes,
}

impl Header {
    /// Create a header. The key must be non-empty.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(FrameError::InvalidFrame("header key is empty".to_string()));
        }
        Ok(Self {
            key,
            value: value.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// The value as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// The value parsed as a decimal integer.
    pub fn as_int(&self) -> Option<i64> {
        self.as_str()?.trim().parse().ok()
    }

    /// The value parsed as `true` / `false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_str()? {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

/// One typed application payload unit.
///
/// The type tag selects how callers interpret the bytes; this layer never
/// looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadObject {
    ponum: u32,
    content: Bytes,
}

impl PayloadObject {
    pub fn new(ponum: u32, content: impl Into<Bytes>) -> Self {
        Self {
            ponum,
            content: content.into(),
        }
    }

    /// Create a payload object from a dotted type tag such as `64.0.1.0`.
    pub fn with_dotted(ponum: &str, content: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(ponum_from_dotted(ponum)?, content))
    }

    pub fn ponum(&self) -> u32 {
        self.ponum
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns true when `ponum & mask == tag & mask`.
    pub fn matches(&self, tag: u32, mask: u32) -> bool {
        self.ponum & mask == tag & mask
    }
}

/// One typed routing or access artifact, such as an access chain element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingObject {
    ronum: u8,
    content: Bytes,
}

impl RoutingObject {
    pub fn new(ronum: u8, content: impl Into<Bytes>) -> Self {
        Self {
            ronum,
            content: content.into(),
        }
    }

    pub fn ronum(&self) -> u8 {
        self.ronum
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Parse a dotted payload-object number (`a.b.c.d`, each octet 0-255).
pub fn ponum_from_dotted(dotted: &str) -> Result<u32> {
    let mut octets = [0u8; 4];
    let mut parts = dotted.split('.');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(|| bad_dotted(dotted))?;
        *octet = part.parse().map_err(|_| bad_dotted(dotted))?;
    }
    if parts.next().is_some() {
        return Err(bad_dotted(dotted));
    }
    Ok(u32::from_be_bytes(octets))
}

/// Format a payload-object number in dotted form.
pub fn ponum_to_dotted(ponum: u32) -> String {
    let [a, b, c, d] = ponum.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

fn bad_dotted(dotted: &str) -> FrameError {
    FrameError::InvalidFrame(format!(
        "payload object number {dotted:?} is not of the form a.b.c.d"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_empty_key() {
        assert!(matches!(
            Header::new("", "x"),
            Err(FrameError::InvalidFrame(_))
        ));
    }

    #[test]
    fn header_typed_views() {
        let h = Header::new("count", "42").unwrap();
        assert_eq!(h.as_int(), Some(42));
        assert_eq!(h.as_str(), Some("42"));
        assert_eq!(h.as_bool(), None);

        let b = Header::new("finished", "true").unwrap();
        assert_eq!(b.as_bool(), Some(true));

        let bin = Header::new("blob", vec![0xff, 0xfe]).unwrap();
        assert_eq!(bin.as_str(), None);
        assert_eq!(bin.value().len(), 2);
    }

    #[test]
    fn payload_object_keeps_exact_length() {
        let po = PayloadObject::new(64, "hello");
        assert_eq!(po.len(), 5);
        assert_eq!(po.content().as_ref(), b"hello");
        assert!(!po.is_empty());
    }

    #[test]
    fn dotted_ponum() {
        assert_eq!(ponum_from_dotted("64.0.1.0").unwrap(), 0x4000_0100);
        assert_eq!(ponum_from_dotted("1.0.0.50").unwrap(), 0x0100_0032);
        assert_eq!(ponum_to_dotted(0x4000_0100), "64.0.1.0");
        assert!(ponum_from_dotted("64.0.1").is_err());
        assert!(ponum_from_dotted("64.0.1.0.0").is_err());
        assert!(ponum_from_dotted("256.0.0.0").is_err());
        assert!(ponum_from_dotted("a.b.c.d").is_err());
    }

    #[test]
    fn masked_match() {
        let po = PayloadObject::with_dotted("64.0.1.0", "x").unwrap();
        assert!(po.matches(0x4000_0000, 0xff00_0000));
        assert!(!po.matches(0x4000_0000, u32::MAX));
        assert!(po.matches(0x4000_0100, u32::MAX));
    }

    #[test]
    fn clone_shares_bytes() {
        let ro = RoutingObject::new(2, vec![1u8, 2, 3]);
        let copy = ro.clone();
        assert_eq!(ro.content().as_ptr(), copy.content().as_ptr());
        assert_eq!(copy.ronum(), 2);
    }
}
