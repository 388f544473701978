use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{Device, Result, ShaperError};

/// The devices known to the control plane, keyed by interface index.
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<FxHashMap<u32, Arc<Device>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device. Fails if its interface index is already taken.
    pub fn register(&self, device: Device) -> Result<Arc<Device>> {
        let ifindex = device.ifindex();
        let mut devices = self.devices.write();
        if devices.contains_key(&ifindex) {
            return Err(ShaperError::InvalidRequest(format!(
                "device with ifindex {ifindex} already registered"
            )));
        }

        debug!(ifindex, dev = %device.name(), "device registered");
        let device = Arc::new(device);
        devices.insert(ifindex, Arc::clone(&device));
        Ok(device)
    }

    /// Removes a device, tearing down its shaper domain.
    pub fn unregister(&self, ifindex: u32) -> Option<Arc<Device>> {
        let device = self.devices.write().remove(&ifindex)?;
        let flushed = device.flush();
        debug!(ifindex, dev = %device.name(), flushed, "device unregistered");
        Some(device)
    }

    /// Looks a device up by interface index.
    pub fn device(&self, ifindex: u32) -> Result<Arc<Device>> {
        self.devices.read().get(&ifindex).cloned().ok_or_else(|| {
            ShaperError::InvalidRequest(format!("no device with ifindex {ifindex}"))
        })
    }

    /// Interface indexes of every registered device, sorted.
    pub fn ifindexes(&self) -> Vec<u32> {
        let mut ids: Vec<_> = self.devices.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
