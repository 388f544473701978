//! Netlink-style attributes.
//!
//! Every request and reply payload is a sequence of attributes:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Length (2 bytes) │  Type (2 bytes)     │  <- attribute header (4 bytes)
//! ├─────────────────────────────────────────┤
//! │  Value (variable length, padded to 4)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The length covers the header and the value, not the padding. Integers are big-endian.
//! Nested attributes carry another attribute sequence as their value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use shaper_common::{Handle, Scope};

use crate::Error;

/// Size of the attribute header.
pub const HEADER_SIZE: usize = 4;

/// The largest value a single attribute can carry.
pub const MAX_VALUE_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Top-level attribute types.
pub mod kind {
    pub const IFINDEX: u16 = 1;
    /// Nested handle, see [`super::handle`].
    pub const HANDLE: u16 = 2;
    /// Nested shaper, see [`super::info`]. Repeated for lists.
    pub const INFO: u16 = 3;
    /// Nested handle pair, see [`super::pair`]. Repeated for lists.
    pub const PAIR: u16 = 4;
    pub const CURSOR: u16 = 5;
    pub const PAGE_SIZE: u16 = 6;
    pub const COUNT: u16 = 7;
    pub const SCOPE: u16 = 8;
    /// Nested capability entry, see [`super::caps`]. Repeated for lists.
    pub const CAPS: u16 = 9;
    pub const ERROR_CODE: u16 = 10;
    pub const ERROR_MSG: u16 = 11;
}

/// Attributes nested in a handle.
pub mod handle {
    pub const SCOPE: u16 = 1;
    pub const MAJOR: u16 = 2;
    pub const MINOR: u16 = 3;
}

/// Attributes nested in a shaper.
pub mod info {
    pub const HANDLE: u16 = 1;
    pub const PARENT: u16 = 2;
    pub const METRIC: u16 = 3;
    pub const BW_MIN: u16 = 4;
    pub const BW_MAX: u16 = 5;
    pub const BURST: u16 = 6;
    pub const PRIORITY: u16 = 7;
    pub const WEIGHT: u16 = 8;
}

/// Attributes nested in a handle pair.
pub mod pair {
    pub const HANDLE: u16 = 1;
    pub const NEW_PARENT: u16 = 2;
}

/// Attributes nested in a capability entry.
pub mod caps {
    pub const SCOPE: u16 = 1;
    pub const FLAGS: u16 = 2;
}

#[inline]
fn padded(len: usize) -> usize {
    (len + 3) & !3
}

fn clip(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Appends attributes to a buffer.
#[derive(Debug, Default)]
pub struct AttrWriter {
    buf: BytesMut,
}

impl AttrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute with a raw value.
    ///
    /// # Panics
    /// Panics if the value is larger than [`MAX_VALUE_SIZE`].
    pub fn put_bytes(&mut self, kind: u16, value: &[u8]) -> &mut Self {
        let len = HEADER_SIZE + value.len();
        let len16 = u16::try_from(len).expect("attribute too large, max 65535 bytes");

        self.buf.reserve(padded(len));
        self.buf.put_u16(len16);
        self.buf.put_u16(kind);
        self.buf.put_slice(value);
        self.buf.put_bytes(0, padded(len) - len);
        self
    }

    pub fn put_u32(&mut self, kind: u16, value: u32) -> &mut Self {
        self.put_bytes(kind, &value.to_be_bytes())
    }

    pub fn put_u64(&mut self, kind: u16, value: u64) -> &mut Self {
        self.put_bytes(kind, &value.to_be_bytes())
    }

    /// Appends a string, clipped to [`MAX_VALUE_SIZE`] bytes on a character boundary.
    pub fn put_str(&mut self, kind: u16, value: &str) -> &mut Self {
        self.put_bytes(kind, clip(value, MAX_VALUE_SIZE).as_bytes())
    }

    /// Appends a nested attribute whose contents are written by `f`.
    pub fn nest(&mut self, kind: u16, f: impl FnOnce(&mut AttrWriter)) -> &mut Self {
        let mut inner = AttrWriter::new();
        f(&mut inner);
        self.put_bytes(kind, &inner.buf)
    }

    /// Appends a nested handle.
    pub fn put_handle(&mut self, kind: u16, value: Handle) -> &mut Self {
        let (scope, major, minor) = value.decode();
        self.nest(kind, |attrs| {
            attrs
                .put_u32(handle::SCOPE, scope as u32)
                .put_u32(handle::MAJOR, major)
                .put_u32(handle::MINOR, minor);
        })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// A parsed attribute. The value doesn't include padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: u16,
    pub value: Bytes,
}

impl Attr {
    pub fn u32(&self) -> Result<u32, Error> {
        let mut value = self.value.clone();
        if value.len() != 4 {
            return Err(Error::Malformed { kind: self.kind, reason: "expected 4 bytes" });
        }
        Ok(value.get_u32())
    }

    pub fn u64(&self) -> Result<u64, Error> {
        let mut value = self.value.clone();
        if value.len() != 8 {
            return Err(Error::Malformed { kind: self.kind, reason: "expected 8 bytes" });
        }
        Ok(value.get_u64())
    }

    pub fn string(&self) -> Result<String, Error> {
        String::from_utf8(self.value.to_vec())
            .map_err(|_| Error::Malformed { kind: self.kind, reason: "invalid utf-8" })
    }

    /// Parses the value as a nested attribute sequence.
    pub fn nested(&self) -> Attrs {
        Attrs::new(self.value.clone())
    }

    /// Parses the value as a nested handle. Every component is required.
    pub fn handle(&self) -> Result<Handle, Error> {
        let (mut scope, mut major, mut minor) = (None, None, None);
        for attr in self.nested() {
            let attr = attr?;
            match attr.kind {
                handle::SCOPE => scope = Some(attr.u32()?),
                handle::MAJOR => major = Some(attr.u32()?),
                handle::MINOR => minor = Some(attr.u32()?),
                _ => {}
            }
        }

        let scope = scope.ok_or(Error::Missing("handle scope"))?;
        let scope = Scope::try_from(scope).map_err(shaper_common::HandleError::UnknownScope)?;
        let major = major.ok_or(Error::Missing("handle major"))?;
        let minor = minor.ok_or(Error::Missing("handle minor"))?;

        Ok(Handle::try_new(scope, major, minor)?)
    }
}

/// An iterator over an attribute sequence. Unknown attribute types are yielded like any other,
/// so callers can skip them.
#[derive(Debug, Clone)]
pub struct Attrs {
    buf: Bytes,
}

impl Attrs {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }
}

impl Iterator for Attrs {
    type Item = Result<Attr, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }

        if self.buf.len() < HEADER_SIZE {
            self.buf.clear();
            return Some(Err(Error::Truncated));
        }

        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        let kind = u16::from_be_bytes([self.buf[2], self.buf[3]]);
        if len < HEADER_SIZE || len > self.buf.len() {
            self.buf.clear();
            return Some(Err(Error::Truncated));
        }

        let value = self.buf.slice(HEADER_SIZE..len);
        // The final attribute may come without its padding.
        self.buf.advance(padded(len).min(self.buf.len()));

        Some(Ok(Attr { kind, value }))
    }
}
