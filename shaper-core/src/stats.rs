use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for a device's shaper transactions.
/// These are shared by every caller operating on the device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    /// Total number of set and move transactions.
    sets: AtomicUsize,
    /// Total number of delete transactions.
    deletes: AtomicUsize,
    /// Total number of entries the backend applied.
    applied: AtomicUsize,
    /// Total number of batches the backend applied only in part.
    partial: AtomicUsize,
    /// Total number of batches the backend rejected outright.
    failed: AtomicUsize,
    /// Total number of provisional entries dropped after a transaction.
    rolled_back: AtomicUsize,
    /// Total number of replies where the backend claimed more than was asked.
    contract_violations: AtomicUsize,
}

impl DeviceStats {
    #[inline]
    pub(crate) fn increment_sets(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_applied(&self, count: usize) {
        self.applied.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_partial(&self) {
        self.partial.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_rolled_back(&self, count: usize) {
        self.rolled_back.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_contract_violations(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn partial(&self) -> usize {
        self.partial.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn contract_violations(&self) -> usize {
        self.contract_violations.load(Ordering::Relaxed)
    }
}
