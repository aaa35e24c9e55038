//! Binary packet.
//!
//! A packet is a typed, length-prefixed payload with a sequential read
//! cursor. All multi-byte values are little-endian. On the wire each packet
//! is preceded by an 8-byte header: the packet type code followed by the
//! payload size, both `u32`.
//!
//! Reading past the end of the payload is an [`Error::OutOfRange`]; no
//! partial read is ever returned.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::{Error, Result},
    math::{BlockPos, Vec3},
};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Packet type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    /// Client -> server: player name. Also used to request a resnapshot.
    PlayerId = 0,
    /// Server -> client: forward delta for one tick.
    WorldChange = 1,
    /// Server -> client: full world snapshot.
    WorldState = 2,
    /// Client -> server: input for one tick.
    ClientInput = 3,
    /// Client -> server: persist the authoritative world.
    SaveWorld = 4,
    /// Client -> server: replace the authoritative world from disk.
    LoadWorld = 5,
}

impl PacketType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => PacketType::PlayerId,
            1 => PacketType::WorldChange,
            2 => PacketType::WorldState,
            3 => PacketType::ClientInput,
            4 => PacketType::SaveWorld,
            5 => PacketType::LoadWorld,
            other => return Err(Error::UnknownPacketType(other)),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::PlayerId => "PlayerId",
            PacketType::WorldChange => "WorldChange",
            PacketType::WorldState => "WorldState",
            PacketType::ClientInput => "ClientInput",
            PacketType::SaveWorld => "SaveWorld",
            PacketType::LoadWorld => "LoadWorld",
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketType,
    pub size: u32,
}

impl PacketHeader {
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        let mut buf = &raw[..];
        let kind = PacketType::from_code(buf.get_u32_le())?;
        let size = buf.get_u32_le();
        Ok(Self { kind, size })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32_le(self.kind.code());
        out.put_u32_le(self.size);
    }
}

/// Values that can be appended to a packet.
pub trait Encode {
    fn encode(&self, p: &mut Packet);
}

/// Values that can be read back from a packet.
pub trait Decode: Sized {
    fn decode(p: &mut Packet) -> Result<Self>;
}

/// Typed byte buffer with a read cursor.
#[derive(Debug, Clone)]
pub struct Packet {
    kind: PacketType,
    buf: BytesMut,
    read_pos: usize,
}

impl Packet {
    pub fn new(kind: PacketType) -> Self {
        Self {
            kind,
            buf: BytesMut::new(),
            read_pos: 0,
        }
    }

    /// Wraps an already-received payload for reading.
    pub fn with_payload(kind: PacketType, payload: &[u8]) -> Self {
        Self {
            kind,
            buf: BytesMut::from(payload),
            read_pos: 0,
        }
    }

    pub fn kind(&self) -> PacketType {
        self.kind
    }

    /// Declared payload size.
    pub fn size(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    pub fn position(&self) -> usize {
        self.read_pos
    }

    pub fn write<T: Encode>(&mut self, value: T) {
        value.encode(self);
    }

    pub fn read<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_all(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Reads exactly `len` raw bytes.
    pub fn read_all(&mut self, len: usize) -> Result<&[u8]> {
        self.take(len)
    }

    /// Clears both the buffer and the cursor.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.read_pos = 0;
    }

    /// Rewinds the cursor only.
    pub fn reset_read(&mut self) {
        self.read_pos = 0;
    }

    /// Header followed by payload, ready for the socket.
    pub fn encode_frame(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.buf.len());
        PacketHeader {
            kind: self.kind,
            size: self.size(),
        }
        .encode(&mut out);
        out.extend_from_slice(&self.buf);
        out.freeze()
    }

    /// Parses one complete frame. Trailing bytes beyond the declared size are
    /// a malformed header.
    pub fn decode_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(Error::MalformedHeader(format!(
                "frame of {} bytes is shorter than the header",
                frame.len()
            )));
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&frame[..HEADER_LEN]);
        let header = PacketHeader::decode(&raw)?;
        let body = &frame[HEADER_LEN..];
        if body.len() != header.size as usize {
            return Err(Error::MalformedHeader(format!(
                "declared size {} but frame carries {} bytes",
                header.size,
                body.len()
            )));
        }
        Ok(Self::with_payload(header.kind, body))
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.remaining() {
            return Err(Error::OutOfRange {
                offset: self.read_pos,
                wanted: n,
                len: self.buf.len(),
            });
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.buf[start..start + n])
    }
}

macro_rules! le_primitive {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Encode for $ty {
            fn encode(&self, p: &mut Packet) {
                p.buf.$put(*self);
            }
        }

        impl Decode for $ty {
            fn decode(p: &mut Packet) -> Result<Self> {
                let mut raw = p.take(std::mem::size_of::<$ty>())?;
                Ok(raw.$get())
            }
        }
    };
}

le_primitive!(u16, put_u16_le, get_u16_le);
le_primitive!(u32, put_u32_le, get_u32_le);
le_primitive!(u64, put_u64_le, get_u64_le);
le_primitive!(i32, put_i32_le, get_i32_le);
le_primitive!(i64, put_i64_le, get_i64_le);
le_primitive!(f32, put_f32_le, get_f32_le);
le_primitive!(f64, put_f64_le, get_f64_le);

impl Encode for u8 {
    fn encode(&self, p: &mut Packet) {
        p.buf.put_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(p.take(1)?[0])
    }
}

impl Encode for bool {
    fn encode(&self, p: &mut Packet) {
        p.buf.put_u8(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(p.take(1)?[0] != 0)
    }
}

impl Encode for Vec3 {
    fn encode(&self, p: &mut Packet) {
        p.write(self.x);
        p.write(self.y);
        p.write(self.z);
    }
}

impl Decode for Vec3 {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Vec3::new(p.read()?, p.read()?, p.read()?))
    }
}

impl Encode for BlockPos {
    fn encode(&self, p: &mut Packet) {
        p.write(self.x);
        p.write(self.y);
        p.write(self.z);
    }
}

impl Decode for BlockPos {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(BlockPos::new(p.read()?, p.read()?, p.read()?))
    }
}

// Strings are null-terminated UTF-8.
impl Encode for &str {
    fn encode(&self, p: &mut Packet) {
        p.buf.extend_from_slice(self.as_bytes());
        p.buf.put_u8(0);
    }
}

impl Encode for String {
    fn encode(&self, p: &mut Packet) {
        self.as_str().encode(p);
    }
}

impl Decode for String {
    fn decode(p: &mut Packet) -> Result<Self> {
        let start = p.read_pos;
        let Some(nul) = p.buf[start..].iter().position(|b| *b == 0) else {
            return Err(Error::OutOfRange {
                offset: start,
                wanted: p.remaining() + 1,
                len: p.buf.len(),
            });
        };
        let raw = p.take(nul + 1)?;
        let text = std::str::from_utf8(&raw[..nul]).map_err(|_| Error::InvalidUtf8(start))?;
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_little_endian() {
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(0x0102_0304u32);
        p.write(true);
        assert_eq!(p.payload(), &[4, 3, 2, 1, 1]);
    }

    #[test]
    fn sequential_read_back() {
        let mut p = Packet::new(PacketType::ClientInput);
        p.write(7u8);
        p.write(-3i32);
        p.write(1.5f32);
        p.write(Vec3::new(1.0, 2.0, 3.0));
        p.write("steve");
        p.write(u64::MAX);

        assert_eq!(p.read::<u8>().unwrap(), 7);
        assert_eq!(p.read::<i32>().unwrap(), -3);
        assert_eq!(p.read::<f32>().unwrap(), 1.5);
        assert_eq!(p.read::<Vec3>().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.read::<String>().unwrap(), "steve");
        assert_eq!(p.read::<u64>().unwrap(), u64::MAX);
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(1u16);
        let err = p.read::<u32>().unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfRange {
                offset: 0,
                wanted: 4,
                len: 2
            }
        ));
        assert!(err.is_desync());
        // Cursor does not move on a failed read.
        assert_eq!(p.read::<u16>().unwrap(), 1);
    }

    #[test]
    fn unterminated_string_is_out_of_range() {
        let mut p = Packet::with_payload(PacketType::PlayerId, b"abc");
        assert!(matches!(
            p.read::<String>(),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn reset_read_rewinds_and_reset_clears() {
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(9u32);
        assert_eq!(p.read::<u32>().unwrap(), 9);
        p.reset_read();
        assert_eq!(p.read::<u32>().unwrap(), 9);
        p.reset();
        assert_eq!(p.size(), 0);
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn frame_header_layout() {
        let mut p = Packet::new(PacketType::ClientInput);
        p.write_all(&[0xAA, 0xBB]);
        let frame = p.encode_frame();
        assert_eq!(&frame[..], &[3, 0, 0, 0, 2, 0, 0, 0, 0xAA, 0xBB]);

        let mut back = Packet::decode_frame(&frame).unwrap();
        assert_eq!(back.kind(), PacketType::ClientInput);
        assert_eq!(back.read_all(2).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn unknown_type_and_truncated_frame_are_rejected() {
        let bogus = [42, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Packet::decode_frame(&bogus),
            Err(Error::UnknownPacketType(42))
        ));
        let short = [1, 0, 0, 0, 4, 0, 0, 0, 1];
        assert!(matches!(
            Packet::decode_frame(&short),
            Err(Error::MalformedHeader(_))
        ));
    }
}
