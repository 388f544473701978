//! The set / delete / move transactions.
//!
//! A set transaction keeps the store in sync with a backend that may apply only a prefix of a
//! batch:
//!
//! 1. every intent is validated and merged with the stored shaper, before anything changes;
//! 2. handles that are not stored yet are staged as provisional slots;
//! 3. the backend applies the batch, reporting how many entries (`K`) it applied;
//! 4. the first `K` intents are committed, every slot still provisional is dropped.
//!
//! Shapers that existed before the transaction are only overwritten in step 4, so an entry the
//! backend did not apply keeps its previous configuration.

use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use shaper_common::{
    default_parent, resolve_parent, validate_parent, Handle, HierarchyError, Scope, ShaperInfo,
    ShaperUpdate,
};

use crate::{Applied, DeviceInfo, DeviceStats, Result, ShaperBackend, ShaperError, ShaperStore};

/// A validated set intent.
#[derive(Debug, Clone, Copy)]
struct Intent {
    /// Sent to the backend. The parent is unspecified when the shaper doesn't have to move.
    request: ShaperInfo,
    /// Stored once the backend applied the request. The parent is always resolved.
    committed: ShaperInfo,
    /// Whether the shaper was not stored before the transaction.
    new: bool,
}

/// Runs transactions for one device against its backend.
pub(crate) struct Transaction<'a> {
    pub(crate) device: &'a DeviceInfo,
    pub(crate) backend: &'a dyn ShaperBackend,
    pub(crate) stats: &'a DeviceStats,
}

impl Transaction<'_> {
    /// Creates or updates the given shapers. Returns how many of them the backend applied,
    /// in order.
    pub(crate) fn set(&self, store: &ShaperStore, updates: &[ShaperUpdate]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let _txn = store.begin();
        self.apply(store, updates, false)
    }

    /// Reparents the given shapers, leaving the rest of their configuration alone. Every
    /// shaper must already exist.
    pub(crate) fn move_shapers(
        &self,
        store: &ShaperStore,
        moves: &[(Handle, Handle)],
    ) -> Result<usize> {
        if moves.is_empty() {
            return Ok(0);
        }

        let updates = try_collect(
            moves.iter().map(|&(handle, parent)| ShaperUpdate::new(handle).parent(parent)),
            moves.len(),
        )?;

        let _txn = store.begin();
        self.apply(store, &updates, true)
    }

    /// Removes the given shapers. Returns how many of them the backend removed, in order.
    pub(crate) fn delete(&self, store: &ShaperStore, handles: &[Handle]) -> Result<usize> {
        if handles.is_empty() {
            return Ok(0);
        }

        check_handles(handles)?;

        let _txn = store.begin();
        self.stats.increment_deletes();

        let applied = self.backend.delete(self.device, handles).map_err(|e| {
            self.stats.increment_failed();
            warn!(
                dev = %self.device.name,
                ?e,
                n = handles.len(),
                "backend rejected shaper delete"
            );
            e
        })?;

        let count = self.clamp("delete", applied, handles.len());
        self.stats.add_applied(count);

        let removed = store.remove_all(&handles[..count]);
        debug!(dev = %self.device.name, count, removed, "shapers deleted");

        Ok(count)
    }

    /// Must be called with the transaction lock held.
    fn apply(
        &self,
        store: &ShaperStore,
        updates: &[ShaperUpdate],
        existing_only: bool,
    ) -> Result<usize> {
        let intents = self.prepare(store, updates, existing_only)?;
        let n = intents.len();
        self.stats.increment_sets();

        let new_count = intents.iter().filter(|intent| intent.new).count();
        let staged = try_collect(
            intents.iter().filter(|intent| intent.new).map(|intent| intent.committed),
            new_count,
        )?;
        store.stage(&staged)?;
        drop(staged);

        let requests = match try_collect(intents.iter().map(|intent| intent.request), n) {
            Ok(requests) => requests,
            Err(e) => {
                store.rollback();
                return Err(e);
            }
        };

        debug!(dev = %self.device.name, n, new = new_count, "applying shapers");

        let applied = match self.backend.set(self.device, &requests) {
            Ok(applied) => applied,
            Err(e) => {
                let dropped = store.rollback();
                self.stats.increment_failed();
                self.stats.add_rolled_back(dropped);
                warn!(dev = %self.device.name, ?e, n, dropped, "backend rejected shaper set");
                return Err(e.into());
            }
        };

        let count = self.clamp("set", applied, n);
        store.commit(intents[..count].iter().map(|intent| intent.committed));
        let dropped = store.rollback();

        self.stats.add_applied(count);
        self.stats.add_rolled_back(dropped);
        debug!(dev = %self.device.name, count, dropped, "shapers committed");

        Ok(count)
    }

    /// Validates the batch and computes what to send and what to store for every entry.
    fn prepare(
        &self,
        store: &ShaperStore,
        updates: &[ShaperUpdate],
        existing_only: bool,
    ) -> Result<Vec<Intent>> {
        let mut intents = try_collect(std::iter::empty(), updates.len())?;
        let mut parents = FxHashMap::default();
        parents.try_reserve(updates.len()).map_err(|e| {
            ShaperError::ResourceExhausted(format!("can't index {} shapers: {e}", updates.len()))
        })?;

        for update in updates {
            let handle = update.handle;
            check_handle(handle)?;

            if let Some(parent) = update.parent {
                parent.try_scope()?;
                validate_parent(handle, parent)?;
            }

            let prev = store.get(handle);
            if existing_only && prev.is_none() {
                return Err(ShaperError::InvalidRequest(format!(
                    "can't find shaper for handle {handle}"
                )));
            }

            let mut committed = update.apply_to(prev.unwrap_or_else(|| ShaperInfo::new(handle)));
            committed.parent = resolve_parent(handle, committed.parent);

            if parents.insert(handle, committed.parent).is_some() {
                return Err(ShaperError::InvalidRequest(format!(
                    "shaper {handle} appears more than once"
                )));
            }

            // Only ask the backend to move the shaper when it doesn't sit there already.
            let current = prev.map_or_else(|| default_parent(handle), |prev| prev.parent);
            let mut request = committed;
            if request.parent == current {
                request.parent = Handle::UNSPEC;
            }

            intents.push(Intent { request, committed, new: prev.is_none() });
        }

        let max_depth = store.len() + parents.len() + Scope::ALL.len();
        for intent in &intents {
            check_ancestry(store, &parents, intent.committed, max_depth)?;
        }

        Ok(intents)
    }

    /// Clamps the applied count to what was requested. A backend reporting more is buggy.
    fn clamp(&self, op: &'static str, applied: Applied, requested: usize) -> usize {
        if applied.count > requested {
            self.stats.increment_contract_violations();
            error!(
                dev = %self.device.name,
                op,
                reported = applied.count,
                requested,
                "backend reported more entries than requested, clamping"
            );
            return requested;
        }

        if applied.count < requested {
            self.stats.increment_partial();
            warn!(
                dev = %self.device.name,
                op,
                applied = applied.count,
                requested,
                reason = applied.reason.as_deref().unwrap_or("none given"),
                "backend applied a partial batch"
            );
        }

        applied.count
    }
}

/// Rejects a batch holding a handle that can't name a shaper.
pub(crate) fn check_handles(handles: &[Handle]) -> Result<()> {
    handles.iter().try_for_each(|&handle| check_handle(handle))
}

/// Rejects handles that can't name a shaper.
fn check_handle(handle: Handle) -> Result<()> {
    if handle.try_scope()? == Scope::Unspecified {
        return Err(ShaperError::InvalidRequest(format!("shaper handle {handle} has no scope")));
    }

    Ok(())
}

/// Walks up from the new parent of `info`, failing if the walk reaches `info` itself.
/// Parents set in the same batch take precedence over stored ones.
fn check_ancestry(
    store: &ShaperStore,
    batch: &FxHashMap<Handle, Handle>,
    info: ShaperInfo,
    max_depth: usize,
) -> Result<()> {
    let cycle = || HierarchyError::Cycle { handle: info.handle, parent: info.parent };

    let mut current = info.parent;
    for _ in 0..max_depth {
        if current.is_unspec() {
            return Ok(());
        }
        if current == info.handle {
            return Err(cycle().into());
        }

        current = match batch.get(&current) {
            Some(parent) => *parent,
            None => store.get(current).map_or_else(|| default_parent(current), |p| p.parent),
        };
    }

    Err(cycle().into())
}

/// Copies `items` into a new vector, reporting allocation failure instead of aborting.
fn try_collect<T>(items: impl Iterator<Item = T>, len: usize) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len).map_err(|e| {
        ShaperError::ResourceExhausted(format!("can't allocate {len} entries: {e}"))
    })?;
    vec.extend(items);
    Ok(vec)
}
