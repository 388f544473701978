#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Async front-end for the shaper control plane.
//!
//! A [`ShaperServer`] exposes the devices of a [`Registry`](shaper_core::Registry) over TCP.
//! Device backends may block, so every request runs on the blocking thread pool. A
//! [`ShaperClient`] issues requests and matches replies by sequence number, so a single
//! connection can carry many requests at once.

mod client;
mod server;

pub use client::*;
pub use server::*;
