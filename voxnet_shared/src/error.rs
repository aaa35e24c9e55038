//! Error types shared by every layer.
//!
//! Each variant belongs to exactly one [`FaultClass`]. Drivers decide how to
//! react from the class, never from the variant:
//! - `Protocol` and `Io` tear down the offending connection.
//! - `Desync` forces a full snapshot resynchronization.
//! - `Invariant` is fatal to the process.

use thiserror::Error;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Protocol,
    Desync,
    Invariant,
    Io,
}

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("read of {wanted} bytes at offset {offset} exceeds payload of {len} bytes")]
    OutOfRange {
        offset: usize,
        wanted: usize,
        len: usize,
    },

    #[error("tick {tick} is no longer resident in history (capacity {capacity})")]
    HistoryEvicted { tick: u64, capacity: usize },

    #[error("unknown packet type {0}")]
    UnknownPacketType(u32),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("string at offset {0} is not valid utf-8")]
    InvalidUtf8(usize),

    #[error("unexpected {0} packet")]
    UnexpectedPacket(&'static str),

    #[error("entity {0} is not registered")]
    UnknownEntity(u32),

    #[error("entity {0} is already registered")]
    EntityExists(u32),

    #[error("unknown entity kind {0}")]
    UnknownEntityKind(u8),

    #[error("unknown field {field} in {block} block")]
    UnknownField { block: &'static str, field: u8 },

    #[error("chunk ({x}, {y}, {z}) is not loaded")]
    UnknownChunk { x: i32, y: i32, z: i32 },

    #[error("unknown block kind {0}")]
    UnknownBlock(u8),

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies the error for recovery decisions.
    pub fn class(&self) -> FaultClass {
        match self {
            Error::OutOfRange { .. } | Error::HistoryEvicted { .. } => FaultClass::Desync,
            Error::UnknownPacketType(_)
            | Error::MalformedHeader(_)
            | Error::PayloadTooLarge { .. }
            | Error::InvalidUtf8(_)
            | Error::UnexpectedPacket(_) => FaultClass::Protocol,
            Error::UnknownEntity(_)
            | Error::EntityExists(_)
            | Error::UnknownEntityKind(_)
            | Error::UnknownField { .. }
            | Error::UnknownChunk { .. }
            | Error::UnknownBlock(_) => FaultClass::Invariant,
            Error::ConnectionClosed | Error::Io(_) => FaultClass::Io,
        }
    }

    pub fn is_desync(&self) -> bool {
        self.class() == FaultClass::Desync
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
