use parking_lot::Mutex;

use shaper_common::{Capabilities, Handle, Scope, ShaperInfo};

use crate::{Applied, BackendError, DeviceInfo, ShaperBackend};

/// Backend that records every call and answers as configured.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    /// Apply at most this many entries per call.
    pub(crate) limit: Mutex<Option<usize>>,
    /// Reject every call with this error.
    pub(crate) fail: Mutex<Option<BackendError>>,
    /// Claim this many more entries than were requested.
    pub(crate) overreport: Mutex<usize>,
    pub(crate) sets: Mutex<Vec<Vec<ShaperInfo>>>,
    pub(crate) deletes: Mutex<Vec<Vec<Handle>>>,
}

impl MockBackend {
    pub(crate) fn limit(&self, limit: usize) {
        *self.limit.lock() = Some(limit);
    }

    pub(crate) fn fail(&self, err: BackendError) {
        *self.fail.lock() = Some(err);
    }

    pub(crate) fn overreport(&self, extra: usize) {
        *self.overreport.lock() = extra;
    }

    pub(crate) fn last_set(&self) -> Vec<ShaperInfo> {
        self.sets.lock().last().cloned().unwrap_or_default()
    }

    fn answer(&self, requested: usize) -> Result<Applied, BackendError> {
        if let Some(err) = self.fail.lock().clone() {
            return Err(err);
        }

        let extra = *self.overreport.lock();
        Ok(match *self.limit.lock() {
            Some(limit) if limit < requested => Applied::partial(limit, "mock limit"),
            _ => Applied::all(requested + extra),
        })
    }
}

impl ShaperBackend for MockBackend {
    fn set(&self, _device: &DeviceInfo, shapers: &[ShaperInfo]) -> Result<Applied, BackendError> {
        self.sets.lock().push(shapers.to_vec());
        self.answer(shapers.len())
    }

    fn delete(&self, _device: &DeviceInfo, handles: &[Handle]) -> Result<Applied, BackendError> {
        self.deletes.lock().push(handles.to_vec());
        self.answer(handles.len())
    }

    fn capabilities(
        &self,
        _device: &DeviceInfo,
        scope: Scope,
    ) -> Result<Capabilities, BackendError> {
        match scope {
            Scope::Queue => Ok(Capabilities::METRIC_BPS | Capabilities::BW_MAX),
            Scope::Netdev => Ok(Capabilities::all()),
            _ => Err(BackendError::Unsupported(format!("scope {scope} not supported"))),
        }
    }
}
