#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The authoritative per-device shaper state.
//!
//! A [`Registry`] holds the [`Device`]s known to the control plane. Each device owns at most one
//! [`ShaperStore`], allocated on the first successful configuration and torn down when the
//! device is unregistered. Configuration changes are pushed to the device's
//! [`ShaperBackend`] by the transaction engine, which keeps the store in sync with however many
//! changes the backend actually applied.

use thiserror::Error;

mod backend;
mod cursor;
mod device;
mod engine;
mod registry;
mod stats;
mod store;

pub use backend::{Applied, BackendError, DeviceInfo, ShaperBackend};
pub use cursor::{Cursor, Page};
pub use device::{Device, DeviceOptions};
pub use registry::Registry;
pub use stats::DeviceStats;
pub use store::ShaperStore;

pub use shaper_common::{
    default_parent, errno, handle, hierarchy, resolve_parent, validate_parent, Capabilities, Handle,
    HandleError, HierarchyError, Metric, Scope, ShaperInfo, ShaperUpdate,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShaperError {
    /// Missing or malformed input, unknown device or shaper. Nothing was modified.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The device or its backend can't do what was asked.
    #[error("not supported: {0}")]
    Unsupported(String),
    /// Memory or store capacity ran out while staging the request. Nothing was modified.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The backend rejected the whole batch.
    #[error("backend error {code}: {reason}")]
    Backend { code: i32, reason: String },
}

impl ShaperError {
    /// The errno reported to control-plane peers for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => errno::EINVAL,
            Self::Unsupported(_) => errno::EOPNOTSUPP,
            Self::ResourceExhausted(_) => errno::ENOMEM,
            Self::Backend { code, .. } => *code,
        }
    }
}

impl From<HandleError> for ShaperError {
    fn from(e: HandleError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl From<HierarchyError> for ShaperError {
    fn from(e: HierarchyError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl From<BackendError> for ShaperError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unsupported(reason) => Self::Unsupported(reason),
            BackendError::Failed { code, reason } => Self::Backend { code, reason },
        }
    }
}

pub type Result<T> = std::result::Result<T, ShaperError>;

#[cfg(test)]
pub(crate) mod testing;
