//! Shaper handle computation.
//!
//! A handle is an opaque 32-bit value that uniquely identifies a shaper within a device. It packs
//! the shaper [`Scope`] together with a major and a minor number, whose meaning depends on the
//! scope:
//!
//! ```text
//!  31      28 27                 16 15                                0
//! ┌──────────┬─────────────────────┬───────────────────────────────────┐
//! │  scope   │  major (VF number)  │  minor (queue / queue-group id)   │
//! └──────────┴─────────────────────┴───────────────────────────────────┘
//! ```
//!
//! | Scope              | major     | minor          |
//! |--------------------|-----------|----------------|
//! | `Port`, `Netdev`   | ignored   | ignored        |
//! | `VirtualFunction`  | VF number | ignored        |
//! | `QueueGroup`       | VF number | queue group id |
//! | `Queue`            | VF number | queue number   |
//! | `Detached`         | VF number | node id        |
//!
//! The scope occupies the most significant bits, so ordering handles by their raw value groups
//! them by scope, then major, then minor.
//!
//! Values wider than their field are truncated by [`Handle::new`]. Use [`Handle::try_new`] to
//! reject them instead.

use std::fmt;

use thiserror::Error;

use crate::Scope;

/// Bit offset of the scope field.
pub const SCOPE_SHIFT: u32 = 28;
/// Bit offset of the major field.
pub const MAJOR_SHIFT: u32 = 16;
/// Width mask of the scope field (4 bits).
pub const SCOPE_MASK: u32 = 0xf;
/// Width mask of the major field (12 bits).
pub const MAJOR_MASK: u32 = 0x0fff;
/// Width mask of the minor field (16 bits).
pub const MINOR_MASK: u32 = 0xffff;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    #[error("unknown scope {0}")]
    UnknownScope(u32),
    #[error("major {0} does not fit in 12 bits")]
    MajorOutOfRange(u32),
    #[error("minor {0} does not fit in 16 bits")]
    MinorOutOfRange(u32),
}

/// A shaper identifier, unique within a device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(u32);

impl Handle {
    /// The "no handle" value. Used as a parent to mean "the default parent for this scope".
    pub const UNSPEC: Handle = Handle(0);

    /// Combines the given scope, major and minor numbers into a handle.
    ///
    /// `major` is truncated to 12 bits and `minor` to 16 bits.
    ///
    /// # Example
    ///
    /// ```
    /// use shaper_common::{Handle, Scope};
    /// assert_eq!(Handle::new(Scope::Queue, 0, 3).raw(), 0x5000_0003);
    /// // out-of-width values lose their high bits
    /// assert_eq!(Handle::new(Scope::Queue, 0, 0x1_0003).minor(), 3);
    /// ```
    #[inline]
    pub const fn new(scope: Scope, major: u32, minor: u32) -> Self {
        Self(
            ((scope as u32 & SCOPE_MASK) << SCOPE_SHIFT)
                | ((major & MAJOR_MASK) << MAJOR_SHIFT)
                | (minor & MINOR_MASK),
        )
    }

    /// Like [`Handle::new`], but fails instead of truncating out-of-width values.
    pub fn try_new(scope: Scope, major: u32, minor: u32) -> Result<Self, HandleError> {
        if major > MAJOR_MASK {
            return Err(HandleError::MajorOutOfRange(major));
        }
        if minor > MINOR_MASK {
            return Err(HandleError::MinorOutOfRange(minor));
        }

        Ok(Self::new(scope, major, minor))
    }

    /// Single-id layout: the id lands in the minor field.
    #[inline]
    pub const fn with_id(scope: Scope, id: u32) -> Self {
        Self::new(scope, 0, id)
    }

    #[inline]
    pub const fn port() -> Self {
        Self::new(Scope::Port, 0, 0)
    }

    #[inline]
    pub const fn netdev() -> Self {
        Self::new(Scope::Netdev, 0, 0)
    }

    #[inline]
    pub const fn vf(vf: u32) -> Self {
        Self::new(Scope::VirtualFunction, vf, 0)
    }

    #[inline]
    pub const fn queue_group(id: u32) -> Self {
        Self::with_id(Scope::QueueGroup, id)
    }

    #[inline]
    pub const fn queue(queue: u32) -> Self {
        Self::with_id(Scope::Queue, queue)
    }

    #[inline]
    pub const fn detached(id: u32) -> Self {
        Self::with_id(Scope::Detached, id)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the raw scope nibble.
    #[inline]
    pub const fn scope_bits(self) -> u32 {
        self.0 >> SCOPE_SHIFT
    }

    /// Returns the scope of this handle, failing on scope values this crate does not know.
    pub fn try_scope(self) -> Result<Scope, HandleError> {
        Scope::try_from(self.scope_bits()).map_err(HandleError::UnknownScope)
    }

    /// Returns the scope of this handle. Unknown scope values decode as
    /// [`Scope::Unspecified`].
    #[inline]
    pub fn scope(self) -> Scope {
        self.try_scope().unwrap_or_default()
    }

    #[inline]
    pub const fn major(self) -> u32 {
        (self.0 >> MAJOR_SHIFT) & MAJOR_MASK
    }

    #[inline]
    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }

    /// Returns the scope, major and minor numbers of this handle.
    #[inline]
    pub fn decode(self) -> (Scope, u32, u32) {
        (self.scope(), self.major(), self.minor())
    }

    /// Whether this handle is the unspecified sentinel (of any id).
    #[inline]
    pub fn is_unspec(self) -> bool {
        self.scope() == Scope::Unspecified
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope(), self.major(), self.minor())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#010x} {})", self.0, self)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}
