#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod caps;
pub mod handle;
pub mod hierarchy;
mod info;
mod scope;

pub use caps::Capabilities;
pub use handle::{Handle, HandleError};
pub use hierarchy::{default_parent, resolve_parent, validate_parent, HierarchyError};
pub use info::{Metric, ShaperInfo, ShaperUpdate};
pub use scope::Scope;

/// Error numbers reported to control-plane peers, following the Linux errno values that
/// drivers return from their shaper callbacks.
pub mod errno {
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const EMSGSIZE: i32 = 90;
    pub const EOPNOTSUPP: i32 = 95;
}
