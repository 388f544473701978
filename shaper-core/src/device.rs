use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use shaper_common::{Capabilities, Handle, Scope, ShaperInfo, ShaperUpdate};

use crate::{
    cursor::{self, Cursor, Page},
    engine::{self, Transaction},
    BackendError, DeviceInfo, DeviceStats, Result, ShaperBackend, ShaperError, ShaperStore,
};

/// The default number of shapers returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Options for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Maximum number of shapers the device may hold. Unbounded by default.
    pub max_shapers: Option<usize>,
    /// Number of shapers per page when the caller doesn't ask for a size.
    pub default_page_size: usize,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self { max_shapers: None, default_page_size: DEFAULT_PAGE_SIZE }
    }
}

impl DeviceOptions {
    /// Sets the maximum number of shapers the device may hold.
    pub fn max_shapers(mut self, max_shapers: usize) -> Self {
        self.max_shapers = Some(max_shapers);
        self
    }

    /// Sets the default listing page size. Clamped to at least 1.
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.max(1);
        self
    }
}

/// A device as seen by the shaper control plane.
///
/// The shaper domain (the device's [`ShaperStore`]) is only allocated by the first set: a
/// device that was never configured has no state besides its identity and backend.
pub struct Device {
    info: DeviceInfo,
    backend: Option<Arc<dyn ShaperBackend>>,
    options: DeviceOptions,
    domain: RwLock<Option<Arc<ShaperStore>>>,
    stats: DeviceStats,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("backend", &self.backend.is_some())
            .field("options", &self.options)
            .field("shapers", &self.domain().map_or(0, |store| store.len()))
            .finish()
    }
}

impl Device {
    /// Creates a device with default options. Without a backend, every shaper request fails
    /// with [`ShaperError::Unsupported`].
    pub fn new(info: DeviceInfo, backend: Option<Arc<dyn ShaperBackend>>) -> Self {
        Self::with_options(info, backend, DeviceOptions::default())
    }

    pub fn with_options(
        info: DeviceInfo,
        backend: Option<Arc<dyn ShaperBackend>>,
        options: DeviceOptions,
    ) -> Self {
        Self {
            info,
            backend,
            options,
            domain: RwLock::new(None),
            stats: DeviceStats::default(),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn ifindex(&self) -> u32 {
        self.info.ifindex
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Whether any shaper was ever configured since registration or the last flush.
    pub fn has_domain(&self) -> bool {
        self.domain.read().is_some()
    }

    /// Returns the shaper with the given handle.
    pub fn get(&self, handle: Handle) -> Result<ShaperInfo> {
        self.backend()?;
        handle.try_scope()?;

        let store = self.domain().ok_or_else(|| self.no_domain())?;

        store.get(handle).ok_or_else(|| {
            ShaperError::InvalidRequest(format!("can't find shaper for handle {handle}"))
        })
    }

    /// Returns the page of shapers following `cursor`, holding at most `budget` of them.
    /// A `budget` of `None` uses the configured default page size.
    pub fn list(&self, cursor: Cursor, budget: Option<usize>) -> Result<Page> {
        self.backend()?;

        let Some(store) = self.domain() else {
            return Ok(Page::default());
        };

        Ok(cursor::walk(&store, cursor, budget.unwrap_or(self.options.default_page_size)))
    }

    /// Returns every configured shaper, in handle order.
    pub fn shapers(&self) -> Vec<ShaperInfo> {
        self.domain().map(|store| store.range_from(Handle::UNSPEC)).unwrap_or_default()
    }

    /// Creates or updates the given shapers, returning how many the backend applied.
    pub fn set(&self, updates: &[ShaperUpdate]) -> Result<usize> {
        let backend = self.backend()?;
        if updates.is_empty() {
            return Ok(0);
        }

        let store = self.domain_or_init();
        self.transaction(backend).set(&store, updates)
    }

    /// Removes the given shapers, returning how many the backend removed.
    ///
    /// A device that never had a shaper configured has nothing to remove: the backend isn't
    /// called and the result is `0`.
    pub fn delete(&self, handles: &[Handle]) -> Result<usize> {
        let backend = self.backend()?;
        engine::check_handles(handles)?;

        let Some(store) = self.domain() else {
            debug!(dev = %self.name(), n = handles.len(), "no shaper domain, nothing to delete");
            return Ok(0);
        };

        self.transaction(backend).delete(&store, handles)
    }

    /// Moves each `(handle, parent)` pair's shaper under `parent`, returning how many moves the
    /// backend applied.
    pub fn move_shapers(&self, moves: &[(Handle, Handle)]) -> Result<usize> {
        let backend = self.backend()?;
        if moves.is_empty() {
            return Ok(0);
        }

        let store = self.domain().ok_or_else(|| self.no_domain())?;
        self.transaction(backend).move_shapers(&store, moves)
    }

    /// Queries the backend for the features supported at `scope`.
    pub fn capabilities(&self, scope: Scope) -> Result<Capabilities> {
        let backend = self.backend()?;
        if scope == Scope::Unspecified {
            return Err(ShaperError::InvalidRequest("capabilities need a scope".to_string()));
        }

        Ok(backend.capabilities(&self.info, scope)?)
    }

    /// Returns the capabilities of every scope the backend supports.
    pub fn capabilities_all(&self) -> Result<Vec<(Scope, Capabilities)>> {
        let backend = self.backend()?;

        let mut all = Vec::with_capacity(Scope::ALL.len());
        for scope in Scope::ALL.into_iter().filter(|scope| *scope != Scope::Unspecified) {
            match backend.capabilities(&self.info, scope) {
                Ok(caps) => all.push((scope, caps)),
                Err(BackendError::Unsupported(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(all)
    }

    /// Tears the shaper domain down, returning how many shapers it held. The hardware is left
    /// alone.
    pub fn flush(&self) -> usize {
        let Some(store) = self.domain.write().take() else {
            return 0;
        };

        // Wait for an in-flight transaction to finish.
        let _txn = store.begin();
        let count = store.flush();
        debug!(dev = %self.name(), count, "shaper domain flushed");
        count
    }

    fn backend(&self) -> Result<&dyn ShaperBackend> {
        self.backend.as_deref().ok_or_else(|| {
            ShaperError::Unsupported(format!("device {} does not support H/W shaper", self.name()))
        })
    }

    fn no_domain(&self) -> ShaperError {
        ShaperError::InvalidRequest(format!("no shaper is initialized on device {}", self.name()))
    }

    fn domain(&self) -> Option<Arc<ShaperStore>> {
        self.domain.read().clone()
    }

    fn domain_or_init(&self) -> Arc<ShaperStore> {
        if let Some(store) = self.domain() {
            return store;
        }

        let mut domain = self.domain.write();
        let store = domain.get_or_insert_with(|| {
            debug!(dev = %self.info.name, "allocating shaper domain");
            Arc::new(match self.options.max_shapers {
                Some(max) => ShaperStore::with_limit(max),
                None => ShaperStore::new(),
            })
        });

        Arc::clone(store)
    }

    fn transaction<'a>(&'a self, backend: &'a dyn ShaperBackend) -> Transaction<'a> {
        Transaction { device: &self.info, backend, stats: &self.stats }
    }
}

#[cfg(test)]
mod tests {
    use shaper_common::Metric;

    use super::*;
    use crate::testing::MockBackend;

    fn device() -> (Device, Arc<MockBackend>) {
        let _ = tracing_subscriber::fmt::try_init();
        let backend = Arc::new(MockBackend::default());
        let device = Device::new(DeviceInfo::new(3, "eth0"), Some(backend.clone()));
        (device, backend)
    }

    #[test]
    fn no_backend_is_unsupported() {
        let device = Device::new(DeviceInfo::new(1, "lo"), None);

        assert!(matches!(device.get(Handle::netdev()), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.list(Cursor::START, None), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.set(&[]), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.delete(&[Handle::queue(0)]), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.move_shapers(&[]), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.capabilities(Scope::Queue), Err(ShaperError::Unsupported(_))));
        assert!(matches!(device.capabilities_all(), Err(ShaperError::Unsupported(_))));

        let err = device.set(&[ShaperUpdate::new(Handle::queue(0))]).unwrap_err();
        assert_eq!(err.errno(), crate::errno::EOPNOTSUPP);
        assert!(err.to_string().contains("lo"));
    }

    #[test]
    fn domain_is_lazy() {
        let (device, _) = device();
        assert!(!device.has_domain());

        let err = device.get(Handle::netdev()).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidRequest(_)));
        assert_eq!(device.list(Cursor::START, None).unwrap(), Page::default());
        assert_eq!(device.set(&[]), Ok(0));
        assert!(!device.has_domain());

        device.set(&[ShaperUpdate::new(Handle::queue(0)).bw_max(1_000)]).unwrap();
        assert!(device.has_domain());

        let info = device.get(Handle::queue(0)).unwrap();
        assert_eq!(info.parent, Handle::netdev());
        assert_eq!(info.bw_max, 1_000);
        assert_eq!(info.metric, Metric::Pps);

        let err = device.get(Handle::queue(1)).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidRequest(_)));
    }

    #[test]
    fn list_pages_through_shapers() {
        let (device, _) = device();
        let updates: Vec<_> = (0..10).map(|q| ShaperUpdate::new(Handle::queue(q))).collect();
        assert_eq!(device.set(&updates), Ok(10));

        let first = device.list(Cursor::START, Some(4)).unwrap();
        assert_eq!(first.shapers.len(), 4);
        let second = device.list(first.next.unwrap(), Some(4)).unwrap();
        assert_eq!(second.shapers[0].handle, Handle::queue(4));
        let third = device.list(second.next.unwrap(), Some(4)).unwrap();
        assert_eq!(third.shapers.len(), 2);
        assert!(third.is_last());

        let small = Device::with_options(
            DeviceInfo::new(4, "eth1"),
            Some(Arc::new(MockBackend::default())),
            DeviceOptions::default().default_page_size(3),
        );
        small.set(&updates).unwrap();
        assert_eq!(small.list(Cursor::START, None).unwrap().shapers.len(), 3);
    }

    #[test]
    fn move_needs_a_domain() {
        let (device, backend) = device();
        let err =
            device.move_shapers(&[(Handle::queue_group(1), Handle::detached(0))]).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidRequest(_)));
        assert!(backend.sets.lock().is_empty());
    }

    #[test]
    fn delete_without_domain_is_a_noop() {
        let (device, backend) = device();
        assert_eq!(device.delete(&[Handle::queue(2)]), Ok(0));

        // the backend is never consulted, so its failures don't surface either
        backend.fail(BackendError::Failed { code: 5, reason: "hw busy".into() });
        assert_eq!(device.delete(&[Handle::queue(2), Handle::detached(1)]), Ok(0));

        assert!(backend.deletes.lock().is_empty());
        assert_eq!(device.stats().deletes(), 0);
        assert!(!device.has_domain());

        // malformed handles are still rejected
        let err = device.delete(&[Handle::UNSPEC]).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidRequest(_)));
    }

    #[test]
    fn capabilities() {
        let (device, _) = device();

        let caps = device.capabilities(Scope::Queue).unwrap();
        assert!(caps.contains(Capabilities::BW_MAX));
        assert!(!caps.contains(Capabilities::BURST));

        assert!(matches!(device.capabilities(Scope::Port), Err(ShaperError::Unsupported(_))));
        assert!(matches!(
            device.capabilities(Scope::Unspecified),
            Err(ShaperError::InvalidRequest(_))
        ));

        let all = device.capabilities_all().unwrap();
        let scopes: Vec<_> = all.iter().map(|(scope, _)| *scope).collect();
        assert_eq!(scopes, vec![Scope::Netdev, Scope::Queue]);
    }

    #[test]
    fn max_shapers() {
        let device = Device::with_options(
            DeviceInfo::new(5, "eth2"),
            Some(Arc::new(MockBackend::default())),
            DeviceOptions::default().max_shapers(2),
        );

        device.set(&[ShaperUpdate::new(Handle::queue(0)), ShaperUpdate::new(Handle::queue(1))])
            .unwrap();
        let err = device.set(&[ShaperUpdate::new(Handle::queue(2))]).unwrap_err();
        assert_eq!(err.errno(), crate::errno::ENOMEM);

        // updating within the limit is still fine
        assert_eq!(device.set(&[ShaperUpdate::new(Handle::queue(1)).weight(4)]), Ok(1));
    }

    #[test]
    fn flush_tears_down_domain() {
        let (device, _) = device();
        device
            .set(&[ShaperUpdate::new(Handle::netdev()), ShaperUpdate::new(Handle::vf(2))])
            .unwrap();

        assert_eq!(device.flush(), 2);
        assert!(!device.has_domain());
        assert!(device.shapers().is_empty());
        assert_eq!(device.flush(), 0);
    }

    #[test]
    fn concurrent_transactions() {
        let (device, backend) = device();
        let device = Arc::new(device);
        backend.limit(3);

        let workers: Vec<_> = (0..8u32)
            .map(|worker| {
                let device = Arc::clone(&device);
                std::thread::spawn(move || {
                    for round in 0..50u32 {
                        if round % 7 == 0 {
                            assert_eq!(device.delete(&[Handle::queue(worker * 5)]), Ok(1));
                        }
                        let updates: Vec<_> = (0..5)
                            .map(|i| {
                                ShaperUpdate::new(Handle::queue(worker * 5 + i))
                                    .bw_max(u64::from(round))
                            })
                            .collect();
                        assert_eq!(device.set(&updates), Ok(3));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        // only the first three queues of every worker were ever applied
        let shapers = device.shapers();
        assert_eq!(shapers.len(), 8 * 3);
        assert!(shapers.iter().all(|info| info.handle.minor() % 5 < 3 && info.bw_max == 49));
        assert_eq!(device.stats().sets(), 8 * 50);
        // the last two queues of every batch were staged and dropped every time
        assert_eq!(device.stats().rolled_back(), 8 * 50 * 2);
    }
}
