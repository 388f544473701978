use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::{Error, VERSION};

/// Default maximum payload size of a frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame flags.
pub mod flags {
    /// Set on every reply.
    pub const REPLY: u16 = 1 << 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The protocol version.
    pub version: u8,
    /// The command or reply type.
    pub cmd: u8,
    pub flags: u16,
    /// The request sequence number, echoed by the reply.
    pub seq: u32,
    /// The size of the payload.
    pub size: u32,
}

impl Header {
    /// Returns the length of the header in bytes.
    #[inline]
    pub const fn len() -> usize {
        12
    }
}

/// A single protocol frame: a header followed by an attribute payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    payload: Bytes,
}

impl Frame {
    /// # Panics
    /// Panics if the payload is larger than 4GiB.
    pub fn new(cmd: u8, flags: u16, seq: u32, payload: Bytes) -> Self {
        Self {
            header: Header {
                version: VERSION,
                cmd,
                flags,
                seq,
                size: u32::try_from(payload.len()).expect("payload too large, max 4GiB"),
            },
            payload,
        }
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn cmd(&self) -> u8 {
        self.header.cmd
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        self.header.flags
    }

    #[inline]
    pub fn is_reply(&self) -> bool {
        self.header.flags & flags::REPLY != 0
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn size(&self) -> usize {
        Header::len() + self.payload.len()
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Header,
    Payload(Header),
}

#[derive(Debug)]
pub struct Codec {
    /// The current state of the decoder.
    state: State,
    /// Frames with a larger payload are rejected.
    max_frame_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Codec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { state: State::Header, max_frame_size }
    }
}

impl Decoder for Codec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Header => {
                    if src.len() < Header::len() {
                        return Ok(None);
                    }

                    let header = Header {
                        version: src.get_u8(),
                        cmd: src.get_u8(),
                        flags: src.get_u16(),
                        seq: src.get_u32(),
                        size: src.get_u32(),
                    };

                    if header.version != VERSION {
                        return Err(Error::Version(header.version));
                    }

                    if header.size as usize > self.max_frame_size {
                        return Err(Error::FrameTooLarge {
                            seq: header.seq,
                            size: header.size as usize,
                            max: self.max_frame_size,
                        });
                    }

                    src.reserve(header.size as usize);
                    self.state = State::Payload(header);
                }
                State::Payload(header) => {
                    if src.len() < header.size as usize {
                        return Ok(None);
                    }

                    let payload = src.split_to(header.size as usize).freeze();
                    trace!(cmd = header.cmd, seq = header.seq, size = header.size, "decoded frame");

                    self.state = State::Header;
                    return Ok(Some(Frame { header, payload }));
                }
            }
        }
    }
}

impl Encoder<Frame> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                seq: item.header.seq,
                size: item.payload.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(item.size());

        dst.put_u8(item.header.version);
        dst.put_u8(item.header.cmd);
        dst.put_u16(item.header.flags);
        dst.put_u32(item.header.seq);
        dst.put_u32(item.header.size);
        dst.put(item.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_in_pieces() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::new();
        let frame = Frame::new(3, 0, 42, Bytes::from_static(b"0123456789"));
        codec.encode(frame.clone(), &mut buf).unwrap();
        codec.encode(Frame::new(1, flags::REPLY, 43, Bytes::new()), &mut buf).unwrap();

        let mut rx = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in buf {
            rx.put_u8(byte);
            if let Some(frame) = codec.decode(&mut rx).unwrap() {
                decoded.push(frame);
            }
        }

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], frame);
        assert_eq!(decoded[1].seq(), 43);
        assert!(decoded[1].is_reply());
        assert!(decoded[1].payload().is_empty());
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut small = Codec::new(4);
        let mut buf = BytesMut::new();
        assert!(matches!(
            small.encode(Frame::new(1, 0, 7, Bytes::from_static(b"12345")), &mut buf),
            Err(Error::FrameTooLarge { seq: 7, size: 5, max: 4 })
        ));

        let frame = Frame::new(1, 0, 7, Bytes::from_static(b"12345"));
        Codec::default().encode(frame, &mut buf).unwrap();
        assert!(matches!(small.decode(&mut buf), Err(Error::FrameTooLarge { seq: 7, .. })));
    }

    #[test]
    fn unknown_version() {
        let mut buf = BytesMut::new();
        buf.put_u8(VERSION + 1);
        buf.put_bytes(0, Header::len() - 1);
        assert!(matches!(
            Codec::default().decode(&mut buf),
            Err(Error::Version(v)) if v == VERSION + 1
        ));
    }
}
