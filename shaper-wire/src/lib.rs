#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The `net-shaper` control protocol.
//!
//! Peers exchange [`Frame`]s over a byte stream. Each frame carries a fixed header and a payload
//! of netlink-style attributes (see [`attr`]). Requests are answered by exactly one reply with
//! the same sequence number.

use thiserror::Error;

pub mod attr;
pub mod frame;
pub mod message;

pub use frame::{Codec, Frame, Header, DEFAULT_MAX_FRAME_SIZE};
pub use message::{Reply, Request};

use shaper_common::HandleError;

/// The protocol family name.
pub const FAMILY_NAME: &str = "net-shaper";

/// The protocol version carried by every frame.
pub const VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported protocol version: {0}")]
    Version(u8),
    #[error("Frame {seq} of {size} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { seq: u32, size: usize, max: usize },
    #[error("Unknown command: {0}")]
    UnknownCommand(u8),
    #[error("Expected a request, got reply {0}")]
    UnexpectedReply(u8),
    #[error("Expected a reply, got request {0}")]
    UnexpectedRequest(u8),
    #[error("Truncated attribute")]
    Truncated,
    #[error("Malformed attribute {kind}: {reason}")]
    Malformed { kind: u16, reason: &'static str },
    #[error("Missing attribute: {0}")]
    Missing(&'static str),
    #[error("Invalid handle: {0}")]
    Handle(#[from] HandleError),
}
