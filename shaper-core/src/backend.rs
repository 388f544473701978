use thiserror::Error;

use shaper_common::{Capabilities, Handle, Scope, ShaperInfo};

/// Identity of a device, handed to the backend on every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Interface index, unique within the registry.
    pub ifindex: u32,
    /// Human readable name, used in error messages and logs.
    pub name: String,
}

impl DeviceInfo {
    pub fn new(ifindex: u32, name: impl Into<String>) -> Self {
        Self { ifindex, name: name.into() }
    }
}

/// The outcome of a batch call that the backend carried out, possibly only in part.
///
/// Entries at positions `[0, count)` of the batch were applied, entries at `[count, n)` were
/// not. `reason` explains a short count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Applied {
    pub count: usize,
    pub reason: Option<String>,
}

impl Applied {
    /// Every one of the `count` entries was applied.
    pub fn all(count: usize) -> Self {
        Self { count, reason: None }
    }

    /// Only the first `count` entries were applied.
    pub fn partial(count: usize, reason: impl Into<String>) -> Self {
        Self { count, reason: Some(reason.into()) }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The operation is not supported by the hardware, the driver, or for the given scope.
    #[error("{0}")]
    Unsupported(String),
    /// The whole batch failed. `code` is a positive errno value.
    #[error("{reason} (code {code})")]
    Failed { code: i32, reason: String },
}

/// Operations on device H/W shapers, implemented by drivers.
///
/// The initial shaping configuration at device initialization is empty and does not constrain
/// bandwidth in any way. The control plane keeps track of the applied configuration in its own
/// per-device store, so backends don't need to answer queries about it.
///
/// Calls may block for as long as the hardware needs. Timeouts are up to the implementation.
pub trait ShaperBackend: Send + Sync + 'static {
    /// Updates or creates the given shapers.
    ///
    /// A shaper with an unspecified parent must not be moved; any other parent means the
    /// shaper has to be (re)attached under it.
    fn set(&self, device: &DeviceInfo, shapers: &[ShaperInfo]) -> Result<Applied, BackendError>;

    /// Removes the given shapers, restoring the default behavior.
    fn delete(&self, device: &DeviceInfo, handles: &[Handle]) -> Result<Applied, BackendError>;

    /// Returns the features supported for the given scope, or
    /// [`BackendError::Unsupported`] when shapers can't be attached there at all.
    fn capabilities(&self, device: &DeviceInfo, scope: Scope)
        -> Result<Capabilities, BackendError>;
}
