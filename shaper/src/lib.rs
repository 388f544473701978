#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Control plane for hierarchical hardware traffic shapers.
//!
//! Re-exports the device registry and transaction engine from `shaper-core`, the TCP server and
//! client from `shaper-socket`, and the simulated backend from `shaper-sim`. The wire protocol is
//! available as [`wire`].

pub use shaper_core::*;
pub use shaper_sim::{Operation, SimBackend, SimOptions};
pub use shaper_socket::*;
pub use shaper_wire as wire;
