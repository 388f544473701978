use shaper_common::{Capabilities, Handle, Metric, Scope, ShaperInfo, ShaperUpdate};

use crate::{
    attr::{self, kind, Attr, AttrWriter, Attrs},
    frame::{flags, Frame},
    Error,
};

/// Request commands.
pub mod cmd {
    pub const GET: u8 = 1;
    pub const DUMP: u8 = 2;
    pub const SET: u8 = 3;
    pub const DELETE: u8 = 4;
    pub const MOVE: u8 = 5;
    pub const CAP_GET: u8 = 6;
    pub const CAP_DUMP: u8 = 7;
}

/// Reply types.
pub mod reply {
    pub const SHAPER: u8 = 1;
    pub const SHAPERS: u8 = 2;
    pub const MODIFIED: u8 = 3;
    pub const CAPABILITIES: u8 = 4;
    pub const ERROR: u8 = 5;
}

/// A control request. Every request targets a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Reads a single shaper.
    Get { ifindex: u32, handle: Handle },
    /// Reads the page of shapers following `cursor` (`0` for the first page).
    Dump { ifindex: u32, cursor: u32, page_size: Option<u32> },
    /// Creates or updates shapers.
    Set { ifindex: u32, shapers: Vec<ShaperUpdate> },
    /// Removes shapers.
    Delete { ifindex: u32, handles: Vec<Handle> },
    /// Reparents shapers, as `(handle, new parent)` pairs.
    Move { ifindex: u32, moves: Vec<(Handle, Handle)> },
    /// Reads the capabilities of one scope.
    CapGet { ifindex: u32, scope: Scope },
    /// Reads the capabilities of every supported scope.
    CapDump { ifindex: u32 },
}

/// The reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Shaper(ShaperInfo),
    /// A page of shapers. `cursor` resumes the listing, `None` on the last page.
    Shapers { shapers: Vec<ShaperInfo>, cursor: Option<u32> },
    /// Number of entries applied by a set, delete or move.
    Modified(u32),
    Capabilities(Vec<(Scope, Capabilities)>),
    /// The request failed. `code` is a positive errno value.
    Error { code: i32, message: String },
}

impl Request {
    pub fn ifindex(&self) -> u32 {
        match self {
            Self::Get { ifindex, .. }
            | Self::Dump { ifindex, .. }
            | Self::Set { ifindex, .. }
            | Self::Delete { ifindex, .. }
            | Self::Move { ifindex, .. }
            | Self::CapGet { ifindex, .. }
            | Self::CapDump { ifindex } => *ifindex,
        }
    }

    pub fn cmd(&self) -> u8 {
        match self {
            Self::Get { .. } => cmd::GET,
            Self::Dump { .. } => cmd::DUMP,
            Self::Set { .. } => cmd::SET,
            Self::Delete { .. } => cmd::DELETE,
            Self::Move { .. } => cmd::MOVE,
            Self::CapGet { .. } => cmd::CAP_GET,
            Self::CapDump { .. } => cmd::CAP_DUMP,
        }
    }

    pub fn to_frame(&self, seq: u32) -> Frame {
        let mut attrs = AttrWriter::new();
        attrs.put_u32(kind::IFINDEX, self.ifindex());

        match self {
            Self::Get { handle, .. } => {
                attrs.put_handle(kind::HANDLE, *handle);
            }
            Self::Dump { cursor, page_size, .. } => {
                attrs.put_u32(kind::CURSOR, *cursor);
                if let Some(size) = page_size {
                    attrs.put_u32(kind::PAGE_SIZE, *size);
                }
            }
            Self::Set { shapers, .. } => {
                for update in shapers {
                    put_update(&mut attrs, update);
                }
            }
            Self::Delete { handles, .. } => {
                for handle in handles {
                    attrs.put_handle(kind::HANDLE, *handle);
                }
            }
            Self::Move { moves, .. } => {
                for (handle, parent) in moves {
                    attrs.nest(kind::PAIR, |pair| {
                        pair.put_handle(attr::pair::HANDLE, *handle)
                            .put_handle(attr::pair::NEW_PARENT, *parent);
                    });
                }
            }
            Self::CapGet { scope, .. } => {
                attrs.put_u32(kind::SCOPE, *scope as u32);
            }
            Self::CapDump { .. } => {}
        }

        Frame::new(self.cmd(), 0, seq, attrs.finish())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, Error> {
        if frame.is_reply() {
            return Err(Error::UnexpectedReply(frame.cmd()));
        }

        let mut ifindex = None;
        let mut handles = Vec::new();
        let mut shapers = Vec::new();
        let mut moves = Vec::new();
        let mut cursor = None;
        let mut page_size = None;
        let mut scope = None;

        for attr in Attrs::new(frame.payload().clone()) {
            let attr = attr?;
            match attr.kind {
                kind::IFINDEX => ifindex = Some(attr.u32()?),
                kind::HANDLE => handles.push(attr.handle()?),
                kind::INFO => shapers.push(parse_update(&attr)?),
                kind::PAIR => moves.push(parse_pair(&attr)?),
                kind::CURSOR => cursor = Some(attr.u32()?),
                kind::PAGE_SIZE => page_size = Some(attr.u32()?),
                kind::SCOPE => scope = Some(parse_scope(&attr)?),
                _ => {}
            }
        }

        let ifindex = ifindex.ok_or(Error::Missing("ifindex"))?;

        Ok(match frame.cmd() {
            cmd::GET => {
                let handle = handles.first().copied().ok_or(Error::Missing("handle"))?;
                Self::Get { ifindex, handle }
            }
            cmd::DUMP => Self::Dump { ifindex, cursor: cursor.unwrap_or(0), page_size },
            cmd::SET => Self::Set { ifindex, shapers },
            cmd::DELETE => Self::Delete { ifindex, handles },
            cmd::MOVE => Self::Move { ifindex, moves },
            cmd::CAP_GET => {
                let scope = scope.ok_or(Error::Missing("scope"))?;
                Self::CapGet { ifindex, scope }
            }
            cmd::CAP_DUMP => Self::CapDump { ifindex },
            other => return Err(Error::UnknownCommand(other)),
        })
    }
}

impl Reply {
    pub fn kind(&self) -> u8 {
        match self {
            Self::Shaper(_) => reply::SHAPER,
            Self::Shapers { .. } => reply::SHAPERS,
            Self::Modified(_) => reply::MODIFIED,
            Self::Capabilities(_) => reply::CAPABILITIES,
            Self::Error { .. } => reply::ERROR,
        }
    }

    pub fn to_frame(&self, seq: u32) -> Frame {
        let mut attrs = AttrWriter::new();

        match self {
            Self::Shaper(info) => put_info(&mut attrs, info),
            Self::Shapers { shapers, cursor } => {
                for info in shapers {
                    put_info(&mut attrs, info);
                }
                if let Some(cursor) = cursor {
                    attrs.put_u32(kind::CURSOR, *cursor);
                }
            }
            Self::Modified(count) => {
                attrs.put_u32(kind::COUNT, *count);
            }
            Self::Capabilities(caps) => {
                for (scope, flags) in caps {
                    attrs.nest(kind::CAPS, |entry| {
                        entry
                            .put_u32(attr::caps::SCOPE, *scope as u32)
                            .put_u64(attr::caps::FLAGS, flags.bits());
                    });
                }
            }
            Self::Error { code, message } => {
                attrs.put_u32(kind::ERROR_CODE, *code as u32).put_str(kind::ERROR_MSG, message);
            }
        }

        Frame::new(self.kind(), flags::REPLY, seq, attrs.finish())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, Error> {
        if !frame.is_reply() {
            return Err(Error::UnexpectedRequest(frame.cmd()));
        }

        let mut shapers = Vec::new();
        let mut caps = Vec::new();
        let mut cursor = None;
        let mut count = None;
        let mut code = None;
        let mut message = String::new();

        for attr in Attrs::new(frame.payload().clone()) {
            let attr = attr?;
            match attr.kind {
                kind::INFO => {
                    let update = parse_update(&attr)?;
                    shapers.push(update.apply_to(ShaperInfo::new(update.handle)));
                }
                kind::CAPS => caps.push(parse_caps(&attr)?),
                kind::CURSOR => cursor = Some(attr.u32()?),
                kind::COUNT => count = Some(attr.u32()?),
                kind::ERROR_CODE => code = Some(attr.u32()? as i32),
                kind::ERROR_MSG => message = attr.string()?,
                _ => {}
            }
        }

        Ok(match frame.cmd() {
            reply::SHAPER => Self::Shaper(shapers.pop().ok_or(Error::Missing("shaper"))?),
            reply::SHAPERS => Self::Shapers { shapers, cursor },
            reply::MODIFIED => Self::Modified(count.ok_or(Error::Missing("count"))?),
            reply::CAPABILITIES => Self::Capabilities(caps),
            reply::ERROR => {
                Self::Error { code: code.ok_or(Error::Missing("error code"))?, message }
            }
            other => return Err(Error::UnknownCommand(other)),
        })
    }
}

/// Writes a complete shaper.
fn put_info(attrs: &mut AttrWriter, info: &ShaperInfo) {
    put_update(attrs, &ShaperUpdate::from(*info));
}

/// Writes the fields present in `update`.
fn put_update(attrs: &mut AttrWriter, update: &ShaperUpdate) {
    attrs.nest(kind::INFO, |nested| {
        nested.put_handle(attr::info::HANDLE, update.handle);
        if let Some(parent) = update.parent {
            nested.put_handle(attr::info::PARENT, parent);
        }
        if let Some(metric) = update.metric {
            nested.put_u32(attr::info::METRIC, metric as u32);
        }
        if let Some(bw_min) = update.bw_min {
            nested.put_u64(attr::info::BW_MIN, bw_min);
        }
        if let Some(bw_max) = update.bw_max {
            nested.put_u64(attr::info::BW_MAX, bw_max);
        }
        if let Some(burst) = update.burst {
            nested.put_u64(attr::info::BURST, burst);
        }
        if let Some(priority) = update.priority {
            nested.put_u32(attr::info::PRIORITY, priority);
        }
        if let Some(weight) = update.weight {
            nested.put_u32(attr::info::WEIGHT, weight);
        }
    });
}

fn parse_update(attr: &Attr) -> Result<ShaperUpdate, Error> {
    let mut handle = None;
    let mut update = ShaperUpdate::new(Handle::UNSPEC);

    for nested in attr.nested() {
        let nested = nested?;
        match nested.kind {
            attr::info::HANDLE => handle = Some(nested.handle()?),
            attr::info::PARENT => update.parent = Some(nested.handle()?),
            attr::info::METRIC => {
                let raw = nested.u32()?;
                let metric = Metric::try_from(raw).map_err(|_| Error::Malformed {
                    kind: nested.kind,
                    reason: "unknown metric",
                })?;
                update.metric = Some(metric);
            }
            attr::info::BW_MIN => update.bw_min = Some(nested.u64()?),
            attr::info::BW_MAX => update.bw_max = Some(nested.u64()?),
            attr::info::BURST => update.burst = Some(nested.u64()?),
            attr::info::PRIORITY => update.priority = Some(nested.u32()?),
            attr::info::WEIGHT => update.weight = Some(nested.u32()?),
            _ => {}
        }
    }

    update.handle = handle.ok_or(Error::Missing("shaper handle"))?;
    Ok(update)
}

fn parse_pair(attr: &Attr) -> Result<(Handle, Handle), Error> {
    let (mut handle, mut parent) = (None, None);
    for nested in attr.nested() {
        let nested = nested?;
        match nested.kind {
            attr::pair::HANDLE => handle = Some(nested.handle()?),
            attr::pair::NEW_PARENT => parent = Some(nested.handle()?),
            _ => {}
        }
    }

    Ok((handle.ok_or(Error::Missing("pair handle"))?, parent.unwrap_or(Handle::UNSPEC)))
}

fn parse_scope(attr: &Attr) -> Result<Scope, Error> {
    Scope::try_from(attr.u32()?)
        .map_err(|_| Error::Malformed { kind: attr.kind, reason: "unknown scope" })
}

fn parse_caps(attr: &Attr) -> Result<(Scope, Capabilities), Error> {
    let (mut scope, mut flags) = (None, Capabilities::empty());
    for nested in attr.nested() {
        let nested = nested?;
        match nested.kind {
            attr::caps::SCOPE => scope = Some(parse_scope(&nested)?),
            attr::caps::FLAGS => flags = Capabilities::from_bits_truncate(nested.u64()?),
            _ => {}
        }
    }

    Ok((scope.ok_or(Error::Missing("capability scope"))?, flags))
}
