use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;

pub const HEADER_SIZE: usize = 6;
pub const DEFAULT_MAX_BODY_SIZE: u32 = 1024 * 1024;

/// Application-defined packet type tag. Every opcode travels as a `u16`.
pub trait Opcode: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn to_raw(self) -> u16;
    fn from_raw(raw: u16) -> Option<Self>;
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width value that can be pushed into or pulled out of a packet body.
pub trait Scalar: sealed::Sealed + Copy {
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl sealed::Sealed for bool {}

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("needed {needed} bytes but only {available} remain")]
    Underflow { needed: usize, available: usize },
    #[error("string is missing its zero terminator")]
    MissingTerminator,
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader<T: Opcode> {
    pub id: T,
    pub size: u32,
}

impl<T: Opcode> PacketHeader<T> {
    pub fn new(id: T) -> Self {
        Self { id, size: 0 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..2].copy_from_slice(&self.id.to_raw().to_le_bytes());
        bytes[2..].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, PacketError> {
        let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
        let size = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let id = T::from_raw(raw).ok_or(PacketError::UnknownOpcode(raw))?;
        Ok(Self { id, size })
    }
}

/// A framed message: header plus an opaque body.
///
/// Fields are pulled in the same order they were pushed. The header size
/// always reports the bytes that are still unread.
#[derive(Debug, Clone)]
pub struct Packet<T: Opcode> {
    header: PacketHeader<T>,
    body: Vec<u8>,
    read_pos: usize,
}

impl<T: Opcode> Packet<T> {
    pub fn new(id: T) -> Self {
        Self {
            header: PacketHeader::new(id),
            body: Vec::new(),
            read_pos: 0,
        }
    }

    pub(crate) fn from_parts(id: T, body: Vec<u8>) -> Self {
        let mut packet = Self {
            header: PacketHeader::new(id),
            body,
            read_pos: 0,
        };
        packet.sync_size();
        packet
    }

    pub fn id(&self) -> T {
        self.header.id
    }

    pub fn set_id(&mut self, id: T) {
        self.header.id = id;
    }

    pub fn header(&self) -> PacketHeader<T> {
        self.header
    }

    pub fn len(&self) -> usize {
        self.body.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unread body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body[self.read_pos..]
    }

    pub fn push<V: Scalar>(&mut self, value: V) -> &mut Self {
        value.write_le(&mut self.body);
        self.sync_size();
        self
    }

    /// Appends the string followed by a zero byte. Anything after an interior
    /// NUL is dropped since the terminator is the only delimiter.
    pub fn push_str(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.body.extend_from_slice(&bytes[..end]);
        self.body.push(0);
        self.sync_size();
        self
    }

    pub fn pull<V: Scalar>(&mut self) -> Result<V, PacketError> {
        let available = self.len();
        if available < V::SIZE {
            return Err(PacketError::Underflow {
                needed: V::SIZE,
                available,
            });
        }

        let value = V::read_le(&self.body[self.read_pos..]);
        self.consume(V::SIZE);
        Ok(value)
    }

    pub fn pull_string(&mut self) -> Result<String, PacketError> {
        let remaining = self.body();
        let end = remaining
            .iter()
            .position(|&b| b == 0)
            .ok_or(PacketError::MissingTerminator)?;

        let value =
            String::from_utf8(remaining[..end].to_vec()).map_err(|_| PacketError::InvalidUtf8)?;
        self.consume(end + 1);
        Ok(value)
    }

    fn consume(&mut self, count: usize) {
        self.read_pos += count;
        if self.read_pos == self.body.len() {
            self.body.clear();
            self.read_pos = 0;
        }
        self.sync_size();
    }

    fn sync_size(&mut self) {
        self.header.size = self.len() as u32;
    }
}

/// A received packet together with the connection it arrived on.
///
/// `remote` is only set for packets received by a server; a client has a
/// single peer and leaves it empty.
#[derive(Debug)]
pub struct OwnedPacket<T: Opcode> {
    pub remote: Option<Arc<Connection<T>>>,
    pub packet: Packet<T>,
}
