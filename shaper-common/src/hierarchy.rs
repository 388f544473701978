//! The fixed shaper tree topology.
//!
//! ```text
//!                         port
//!                 ┌────────┴────────┐
//!               netdev          vf(n) ...
//!        ┌────────┼──────────┐
//!   queue(0)  queue(1)  queue_group(g)        detached(d)
//! ```
//!
//! Every scope has an implicit default parent. A shaper stored with an unspecified parent is
//! attached to that default.

use thiserror::Error;

use crate::{Handle, Scope};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("shaper {0} can't be its own parent")]
    SelfParent(Handle),
    #[error("queue shaper {handle} can only be nested under a netdev shaper, not {parent}")]
    QueueParent { handle: Handle, parent: Handle },
    #[error("shaper {handle} can't be nested under queue shaper {parent}")]
    LeafParent { handle: Handle, parent: Handle },
    #[error("port shaper {handle} can't have a parent ({parent})")]
    RootParent { handle: Handle, parent: Handle },
    #[error("moving {handle} under {parent} would make it its own ancestor")]
    Cycle { handle: Handle, parent: Handle },
}

/// Returns the implicit parent of the given shaper.
///
/// | scope                            | default parent |
/// |----------------------------------|----------------|
/// | `Detached`, `Port`, `Unspecified`| none           |
/// | `Queue`, `QueueGroup`            | `netdev`       |
/// | `Netdev`, `VirtualFunction`      | `port`         |
pub fn default_parent(handle: Handle) -> Handle {
    let parent = match handle.scope() {
        Scope::Detached | Scope::Port | Scope::Unspecified => return Handle::UNSPEC,
        Scope::Queue | Scope::QueueGroup => Scope::Netdev,
        Scope::Netdev | Scope::VirtualFunction => Scope::Port,
    };

    Handle::new(parent, 0, 0)
}

/// Returns the parent a shaper is effectively attached to: `parent` itself, or the scope's
/// default when `parent` is unspecified.
#[inline]
pub fn resolve_parent(handle: Handle, parent: Handle) -> Handle {
    if parent.is_unspec() {
        default_parent(handle)
    } else {
        parent
    }
}

/// Checks the static nesting rules for an explicit `parent` of `handle`. An unspecified parent
/// is always legal. Ancestor cycles depend on the stored tree and are not detected here.
pub fn validate_parent(handle: Handle, parent: Handle) -> Result<(), HierarchyError> {
    if parent.is_unspec() {
        return Ok(());
    }

    if parent == handle {
        return Err(HierarchyError::SelfParent(handle));
    }

    match (handle.scope(), parent.scope()) {
        (Scope::Port, _) => Err(HierarchyError::RootParent { handle, parent }),
        (_, Scope::Queue) => Err(HierarchyError::LeafParent { handle, parent }),
        (Scope::Queue, Scope::Netdev) => Ok(()),
        (Scope::Queue, _) => Err(HierarchyError::QueueParent { handle, parent }),
        _ => Ok(()),
    }
}
