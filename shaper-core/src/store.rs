use std::collections::BTreeMap;

use parking_lot::{Mutex, MutexGuard, RwLock};

use shaper_common::{resolve_parent, Handle, ShaperInfo};

use crate::{Result, ShaperError};

/// A stored shaper. `provisional` slots were staged by an in-flight transaction and are not
/// visible to readers until the backend confirms them.
#[derive(Debug, Clone, Copy)]
struct Slot {
    info: ShaperInfo,
    provisional: bool,
}

/// The shapers configured on one device, keyed and ordered by handle.
///
/// Reads take a shared lock and copy records out, so a reader never observes a half-written
/// record. Transactions are serialized by a separate lock (see [`ShaperStore::begin`]) which
/// is held across the backend call, while the map itself is only write-locked for the short
/// staging, commit and rollback steps.
#[derive(Debug, Default)]
pub struct ShaperStore {
    shapers: RwLock<BTreeMap<Handle, Slot>>,
    /// Serializes transactions on this store.
    txn: Mutex<()>,
    /// Maximum number of stored shapers, provisional ones included.
    max_shapers: Option<usize>,
}

impl ShaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that refuses to hold more than `max_shapers` shapers.
    pub fn with_limit(max_shapers: usize) -> Self {
        Self { max_shapers: Some(max_shapers), ..Default::default() }
    }

    /// Returns the shaper with the given handle. The returned parent is always resolved.
    pub fn get(&self, handle: Handle) -> Option<ShaperInfo> {
        self.shapers.read().get(&handle).filter(|slot| !slot.provisional).map(Slot::resolved)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Inserts or replaces a shaper, returning the previous one.
    pub fn upsert(&self, info: ShaperInfo) -> Option<ShaperInfo> {
        let slot = Slot { info: Slot::resolve(info), provisional: false };
        self.shapers.write().insert(info.handle, slot).map(|prev| prev.info)
    }

    /// Removes a shaper, returning it.
    pub fn remove(&self, handle: Handle) -> Option<ShaperInfo> {
        self.shapers.write().remove(&handle).map(|slot| slot.info)
    }

    /// Returns every shaper with a handle greater than or equal to `lower`, in ascending handle
    /// order.
    pub fn range_from(&self, lower: Handle) -> Vec<ShaperInfo> {
        self.page_from(lower, usize::MAX)
    }

    /// Like [`ShaperStore::range_from`], returning at most `limit` shapers.
    pub fn page_from(&self, lower: Handle, limit: usize) -> Vec<ShaperInfo> {
        self.shapers
            .read()
            .range(lower..)
            .filter(|(_, slot)| !slot.provisional)
            .take(limit)
            .map(|(_, slot)| slot.resolved())
            .collect()
    }

    /// Number of committed shapers.
    pub fn len(&self) -> usize {
        self.shapers.read().values().filter(|slot| !slot.provisional).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every shaper, returning how many there were.
    pub fn flush(&self) -> usize {
        let mut shapers = self.shapers.write();
        let count = shapers.len();
        shapers.clear();
        count
    }

    /// Starts a transaction. Bookkeeping of concurrent transactions never interleaves: the
    /// returned guard must be held until the transaction has been committed or rolled back.
    pub(crate) fn begin(&self) -> MutexGuard<'_, ()> {
        self.txn.lock()
    }

    /// Inserts provisional slots for the given shapers. Handles must not be stored yet.
    ///
    /// Fails without leaving anything staged if the store limit would be exceeded.
    pub(crate) fn stage(&self, shapers: &[ShaperInfo]) -> Result<()> {
        let mut map = self.shapers.write();

        if let Some(max) = self.max_shapers {
            if map.len() + shapers.len() > max {
                return Err(ShaperError::ResourceExhausted(format!(
                    "can't store {} more shapers ({} of {max} in use)",
                    shapers.len(),
                    map.len()
                )));
            }
        }

        for info in shapers {
            let prev = map.insert(info.handle, Slot { info: *info, provisional: true });
            debug_assert!(prev.is_none(), "staged over existing shaper {}", info.handle);
        }

        Ok(())
    }

    /// Writes the final version of the given shapers and clears their provisional mark.
    pub(crate) fn commit(&self, shapers: impl IntoIterator<Item = ShaperInfo>) {
        let mut map = self.shapers.write();
        for info in shapers {
            let slot = Slot {
                info: Slot::resolve(info),
                provisional: false,
            };
            map.insert(info.handle, slot);
        }
    }

    /// Drops every still-provisional slot, returning how many were dropped.
    pub(crate) fn rollback(&self) -> usize {
        let mut map = self.shapers.write();
        let before = map.len();
        map.retain(|_, slot| !slot.provisional);
        before - map.len()
    }

    /// Removes the given shapers, returning how many were stored.
    pub(crate) fn remove_all(&self, handles: &[Handle]) -> usize {
        let mut map = self.shapers.write();
        handles.iter().filter(|handle| map.remove(*handle).is_some()).count()
    }
}

impl Slot {
    #[inline]
    fn resolve(mut info: ShaperInfo) -> ShaperInfo {
        info.parent = resolve_parent(info.handle, info.parent);
        info
    }

    #[inline]
    fn resolved(&self) -> ShaperInfo {
        Self::resolve(self.info)
    }
}
