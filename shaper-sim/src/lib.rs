#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Simulated shaper hardware.
//!
//! [`SimBackend`] implements [`ShaperBackend`] on top of an in-memory model of a NIC scheduler.
//! It validates every shaper against the capabilities of its scope, applies shapers one by one
//! and stops at the first one it can't take, like a driver would. Impairments can be switched
//! on at any time: an accept limit (partial application), whole-batch failures, an over-reported
//! applied count, and per-call latency.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use shaper_core::{
    default_parent, Applied, BackendError, Capabilities, DeviceInfo, Handle, Metric, Scope,
    ShaperBackend, ShaperInfo,
};

mod profile;

pub use profile::SimOptions;

/// A call the backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Set { shapers: Vec<ShaperInfo>, applied: usize },
    Delete { handles: Vec<Handle>, applied: usize },
}

/// Impairments, adjustable while the backend is in use.
#[derive(Debug, Clone, Default)]
struct Impairments {
    accept_limit: Option<usize>,
    failure: Option<BackendError>,
    lie_about_count: usize,
}

#[derive(Debug, Default)]
struct Hardware {
    shapers: BTreeMap<Handle, ShaperInfo>,
    log: Vec<Operation>,
}

/// A simulated device scheduler.
#[derive(Debug, Default)]
pub struct SimBackend {
    options: SimOptions,
    impairments: Mutex<Impairments>,
    hardware: Mutex<Hardware>,
}

impl SimBackend {
    /// Creates a backend supporting every scope with every capability.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SimOptions) -> Self {
        Self { options, ..Default::default() }
    }

    /// Applies at most `limit` entries per call. `None` lifts the limit.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.impairments.lock().accept_limit = limit;
    }

    /// Fails every set and delete call with `failure`. `None` stops failing.
    pub fn set_failure(&self, failure: Option<BackendError>) {
        self.impairments.lock().failure = failure;
    }

    /// Reports `extra` more applied entries than were actually applied.
    pub fn set_lie_about_count(&self, extra: usize) {
        self.impairments.lock().lie_about_count = extra;
    }

    /// The calls received so far, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        self.hardware.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.hardware.lock().log.clear();
    }

    /// The shapers configured in hardware, in handle order. Parents are resolved.
    pub fn hardware(&self) -> Vec<ShaperInfo> {
        self.hardware.lock().shapers.values().copied().collect()
    }

    pub fn hardware_shaper(&self, handle: Handle) -> Option<ShaperInfo> {
        self.hardware.lock().shapers.get(&handle).copied()
    }

    /// Checks a shaper against the capabilities of its scope.
    fn admit(&self, info: &ShaperInfo) -> Result<(), String> {
        let scope = info.handle.scope();
        let caps = self
            .options
            .capabilities(scope)
            .ok_or_else(|| format!("scope {scope} not supported"))?;

        let metric = match info.metric {
            Metric::Bps => Capabilities::METRIC_BPS,
            Metric::Pps => Capabilities::METRIC_PPS,
        };

        let nested = !info.parent.is_unspec() && info.parent != default_parent(info.handle);
        let required = [
            (true, metric, "metric"),
            (info.bw_min != 0, Capabilities::BW_MIN, "bw-min"),
            (info.bw_max != 0, Capabilities::BW_MAX, "bw-max"),
            (info.burst != 0, Capabilities::BURST, "burst"),
            (info.priority != 0, Capabilities::PRIORITY, "priority"),
            (info.weight != 0, Capabilities::WEIGHT, "weight"),
            (nested, Capabilities::NESTING, "nesting"),
        ];

        for (used, flag, name) in required {
            if used && !caps.contains(flag) {
                return Err(format!("{name} not supported for {} on scope {scope}", info.handle));
            }
        }

        Ok(())
    }

    fn before_call(&self) -> Result<Impairments, BackendError> {
        if let Some(latency) = self.options.latency {
            std::thread::sleep(latency);
        }

        let impairments = self.impairments.lock().clone();
        match impairments.failure {
            Some(ref failure) => Err(failure.clone()),
            None => Ok(impairments),
        }
    }
}

impl ShaperBackend for SimBackend {
    fn set(&self, device: &DeviceInfo, shapers: &[ShaperInfo]) -> Result<Applied, BackendError> {
        let impairments = self.before_call()?;
        let limit = impairments.accept_limit.unwrap_or(usize::MAX);

        let mut hw = self.hardware.lock();
        let mut applied = 0;
        let mut reason = None;

        for info in shapers {
            if applied >= limit {
                reason = Some(format!("accept limit of {limit} reached"));
                break;
            }

            if let Err(rejected) = self.admit(info) {
                if applied == 0 {
                    hw.log.push(Operation::Set { shapers: shapers.to_vec(), applied });
                    return Err(BackendError::Unsupported(rejected));
                }
                reason = Some(rejected);
                break;
            }

            // An unspecified parent leaves the shaper where it is.
            let parent = if info.parent.is_unspec() {
                hw.shapers
                    .get(&info.handle)
                    .map_or_else(|| default_parent(info.handle), |shaper| shaper.parent)
            } else {
                info.parent
            };

            trace!(dev = %device.name, handle = %info.handle, %parent, "shaper programmed");
            hw.shapers.insert(info.handle, ShaperInfo { parent, ..*info });
            applied += 1;
        }

        hw.log.push(Operation::Set { shapers: shapers.to_vec(), applied });
        debug!(dev = %device.name, applied, requested = shapers.len(), "set");

        let count = applied + impairments.lie_about_count;
        Ok(Applied { count, reason })
    }

    fn delete(&self, device: &DeviceInfo, handles: &[Handle]) -> Result<Applied, BackendError> {
        let impairments = self.before_call()?;
        let limit = impairments.accept_limit.unwrap_or(usize::MAX);

        let mut hw = self.hardware.lock();
        let applied = handles.len().min(limit);
        for handle in &handles[..applied] {
            hw.shapers.remove(handle);
        }

        hw.log.push(Operation::Delete { handles: handles.to_vec(), applied });
        debug!(dev = %device.name, applied, requested = handles.len(), "delete");

        let reason = (applied < handles.len()).then(|| format!("accept limit of {limit} reached"));
        Ok(Applied { count: applied + impairments.lie_about_count, reason })
    }

    fn capabilities(
        &self,
        _device: &DeviceInfo,
        scope: Scope,
    ) -> Result<Capabilities, BackendError> {
        self.options
            .capabilities(scope)
            .ok_or_else(|| BackendError::Unsupported(format!("scope {scope} not supported")))
    }
}

#[cfg(test)]
mod tests {
    use shaper_core::ShaperUpdate;

    use super::*;

    fn dev() -> DeviceInfo {
        DeviceInfo::new(1, "sim0")
    }

    #[test]
    fn programs_shapers_in_order() {
        let sim = SimBackend::new();
        let batch = [
            ShaperInfo::new(Handle::queue(0)).with_bw_max(10),
            ShaperInfo::new(Handle::queue_group(1)).with_parent(Handle::detached(0)),
        ];

        assert_eq!(sim.set(&dev(), &batch), Ok(Applied::all(2)));
        assert_eq!(sim.hardware_shaper(Handle::queue(0)).unwrap().parent, Handle::netdev());
        let group = sim.hardware_shaper(Handle::queue_group(1)).unwrap();
        assert_eq!(group.parent, Handle::detached(0));

        // an unspecified parent keeps the shaper where it is
        let update = ShaperUpdate::new(Handle::queue_group(1)).weight(3).apply_to(batch[1]);
        sim.set(&dev(), &[update.with_parent(Handle::UNSPEC)]).unwrap();
        let info = sim.hardware_shaper(Handle::queue_group(1)).unwrap();
        assert_eq!((info.parent, info.weight), (Handle::detached(0), 3));
    }

    #[test]
    fn stops_at_first_unsupported_entry() {
        let sim = SimBackend::with_options(
            SimOptions::empty()
                .scope(Scope::Netdev, Capabilities::all())
                .scope(Scope::Queue, Capabilities::METRIC_PPS | Capabilities::BW_MAX),
        );

        let batch = [
            ShaperInfo::new(Handle::queue(0)).with_bw_max(1),
            ShaperInfo::new(Handle::queue(1)).with_burst(1),
            ShaperInfo::new(Handle::queue(2)),
        ];
        let applied = sim.set(&dev(), &batch).unwrap();
        assert_eq!(applied.count, 1);
        assert!(applied.reason.unwrap().contains("burst"));
        assert_eq!(sim.hardware().len(), 1);

        // nothing applied at all is an error
        let err = sim.set(&dev(), &[ShaperInfo::new(Handle::vf(1))]).unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));

        assert!(sim.capabilities(&dev(), Scope::Queue).is_ok());
        assert!(sim.capabilities(&dev(), Scope::Detached).is_err());
    }

    #[test]
    fn impairments() {
        let sim = SimBackend::new();
        let batch: Vec<_> = (0..4).map(|q| ShaperInfo::new(Handle::queue(q))).collect();

        sim.set_accept_limit(Some(3));
        assert_eq!(sim.set(&dev(), &batch).unwrap().count, 3);
        let handles: Vec<_> = batch.iter().map(|info| info.handle).collect();
        assert_eq!(sim.delete(&dev(), &handles).unwrap().count, 3);
        assert!(sim.hardware().is_empty());

        sim.set_accept_limit(None);
        sim.set_lie_about_count(2);
        assert_eq!(sim.set(&dev(), &batch).unwrap().count, 6);

        sim.set_failure(Some(BackendError::Failed { code: 16, reason: "busy".into() }));
        assert!(matches!(sim.set(&dev(), &batch), Err(BackendError::Failed { code: 16, .. })));
        assert!(sim.delete(&dev(), &[Handle::queue(0)]).is_err());
        assert_eq!(sim.hardware().len(), 4);

        let ops = sim.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[1], Operation::Delete { applied: 3, .. }));
        sim.clear_operations();
        assert!(sim.operations().is_empty());
    }
}
