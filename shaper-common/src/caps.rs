use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

/// The features a device supports for shapers of a given scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u64);

impl Capabilities {
    /// Bandwidth limits can be expressed in bits per second.
    pub const METRIC_BPS: Self = Self(1 << 0);
    /// Bandwidth limits can be expressed in packets per second.
    pub const METRIC_PPS: Self = Self(1 << 1);
    /// Shapers of this scope can be nested under other shapers.
    pub const NESTING: Self = Self(1 << 2);
    pub const BW_MIN: Self = Self(1 << 3);
    pub const BW_MAX: Self = Self(1 << 4);
    pub const BURST: Self = Self(1 << 5);
    pub const PRIORITY: Self = Self(1 << 6);
    pub const WEIGHT: Self = Self(1 << 7);

    const NAMED: [(Self, &'static str); 8] = [
        (Self::METRIC_BPS, "METRIC_BPS"),
        (Self::METRIC_PPS, "METRIC_PPS"),
        (Self::NESTING, "NESTING"),
        (Self::BW_MIN, "BW_MIN"),
        (Self::BW_MAX, "BW_MAX"),
        (Self::BURST, "BURST"),
        (Self::PRIORITY, "PRIORITY"),
        (Self::WEIGHT, "WEIGHT"),
    ];

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known capability.
    #[inline]
    pub const fn all() -> Self {
        Self(0xff)
    }

    /// Builds a set from raw bits, dropping unknown ones.
    #[inline]
    pub const fn from_bits_truncate(bits: u64) -> Self {
        Self(bits & Self::all().0)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterates over the individual flags set in `self`.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::NAMED.into_iter().map(|(flag, _)| flag).filter(move |flag| self.contains(*flag))
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Capabilities(empty)");
        }

        f.write_str("Capabilities(")?;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}
