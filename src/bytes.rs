//! Little-endian byte-level codec primitives for the simulator wire
//! protocol.
//!
//! The simulator is a separately-compiled process; relying on native
//! `#[repr(C)]` struct layout for the socket protocol would leak padding and
//! endianness assumptions across the boundary. Every wire struct in
//! [`crate::event`] is instead serialized field-by-field through a
//! [`ByteWriter`] / [`ByteReader`] pair, the same way Rubble's link-layer
//! codec avoids relying on native layout for over-the-air PDUs.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// An error produced when a read or write runs out of space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Eof;

impl fmt::Display for Eof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("buffer too small")
    }
}

impl std::error::Error for Eof {}

/// A cursor over a mutable byte slice that writes little-endian fields.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        ByteWriter { buf, pos: 0 }
    }

    pub fn space_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn reserve(&mut self, len: usize) -> Result<&mut [u8], Eof> {
        if self.space_left() < len {
            return Err(Eof);
        }
        let slice = &mut self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), Eof> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), Eof> {
        self.write_u8(v as u8)
    }

    pub fn write_u16_le(&mut self, v: u16) -> Result<(), Eof> {
        LittleEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn write_u32_le(&mut self, v: u32) -> Result<(), Eof> {
        LittleEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn write_i32_le(&mut self, v: i32) -> Result<(), Eof> {
        self.write_u32_le(v as u32)
    }

    pub fn write_u64_le(&mut self, v: u64) -> Result<(), Eof> {
        LittleEndian::write_u64(self.reserve(8)?, v);
        Ok(())
    }

    pub fn write_slice(&mut self, data: &[u8]) -> Result<(), Eof> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }
}

/// A cursor over an immutable byte slice that reads little-endian fields.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn bytes_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_left() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Eof> {
        if self.bytes_left() < len {
            return Err(Eof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, Eof> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Eof> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, Eof> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, Eof> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, Eof> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, Eof> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Eof> {
        self.take(len)
    }

    /// Reads the rest of the buffer as a slice.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Eof> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let mut buf = [0u8; 32];
        {
            let mut w = ByteWriter::new(&mut buf);
            w.write_u8(0xab).unwrap();
            w.write_u16_le(0x1234).unwrap();
            w.write_u32_le(0xdead_beef).unwrap();
            w.write_u64_le(0x0102_0304_0506_0708).unwrap();
            w.write_i8(-5).unwrap();
        }
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16_le().unwrap(), 0x1234);
        assert_eq!(r.read_u32_le().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64_le().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_i8().unwrap(), -5);
    }

    #[test]
    fn write_fails_when_buffer_too_small() {
        let mut buf = [0u8; 1];
        let mut w = ByteWriter::new(&mut buf);
        assert!(w.write_u16_le(1).is_err());
    }

    #[test]
    fn read_fails_when_buffer_exhausted() {
        let buf = [0u8; 1];
        let mut r = ByteReader::new(&buf);
        assert!(r.read_u16_le().is_err());
    }

    #[test]
    fn read_rest_consumes_remaining_bytes() {
        let buf = [1, 2, 3, 4];
        let mut r = ByteReader::new(&buf);
        r.read_u8().unwrap();
        assert_eq!(r.read_rest(), &[2, 3, 4]);
        assert!(r.is_empty());
    }
}
