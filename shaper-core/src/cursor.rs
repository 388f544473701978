//! Resumable enumeration of a device's shapers.
//!
//! A listing is split into pages. Between pages the caller only keeps a [`Cursor`]: the raw
//! handle of the last shaper it received. The next page starts right after it. Since handles
//! never change for the life of a shaper and pages follow raw handle order, walking every page
//! emits each shaper exactly once, unless it is deleted before being reached.

use shaper_common::{Handle, ShaperInfo};

use crate::ShaperStore;

/// An opaque resume point for a paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cursor(u32);

impl Cursor {
    /// The cursor of the first page.
    pub const START: Cursor = Cursor(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The lowest handle the page resumed from this cursor may contain, if any is left.
    #[inline]
    fn lower_bound(self) -> Option<Handle> {
        self.0.checked_add(1).map(Handle::from_raw)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// The shapers of this page, in ascending handle order.
    pub shapers: Vec<ShaperInfo>,
    /// Where the next page resumes. `None` when the listing is complete.
    pub next: Option<Cursor>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Reads the page following `cursor`, holding at most `budget` shapers (at least one).
pub(crate) fn walk(store: &ShaperStore, cursor: Cursor, budget: usize) -> Page {
    let budget = budget.max(1);
    let Some(lower) = cursor.lower_bound() else {
        return Page::default();
    };

    // One extra entry tells whether another page follows.
    let mut shapers = store.page_from(lower, budget.saturating_add(1));
    let next = if shapers.len() > budget {
        shapers.truncate(budget);
        shapers.last().map(|info| Cursor(info.handle.raw()))
    } else {
        None
    };

    Page { shapers, next }
}
