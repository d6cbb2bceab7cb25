//! Seekable in-memory byte buffer
//!
//! Both AMF0 and AMF3 decode by walking forward through a buffer while
//! occasionally needing to checkpoint position (for `EndOfStream` retry,
//! §4.8) or peek ahead (lenient end-marker handling). `bytes::Bytes` gives
//! cheap slicing; this wraps it with the typed reads the codecs need plus
//! a cursor so position can be saved and restored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{AmfError, Result};

/// Byte order used for multi-byte fields. AMF streams are big-endian
/// throughout; little-endian is exposed for completeness (LSO tooling in
/// the wild occasionally round-trips through little-endian host dumps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// A seekable read cursor over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct ByteStream {
    buf: Bytes,
    pos: usize,
    endian: Endianness,
}

impl ByteStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            buf: data.into(),
            pos: 0,
            endian: Endianness::Big,
        }
    }

    pub fn with_endian(data: impl Into<Bytes>, endian: Endianness) -> Self {
        Self {
            buf: data.into(),
            pos: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endianness) {
        self.endian = endian;
    }

    /// Current cursor position, in bytes from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor to an absolute position. Used to restore position
    /// after a short read (`EndOfStream`, §4.8).
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(AmfError::EndOfStream)
        } else {
            Ok(())
        }
    }

    /// Returns the next `n` bytes without advancing the cursor.
    pub fn peek(&self, n: usize) -> Result<Bytes> {
        self.require(n)?;
        Ok(self.buf.slice(self.pos..self.pos + n))
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.require(1)?;
        Ok(self.buf[self.pos])
    }

    /// True if the upcoming bytes equal `prefix`; does not advance.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.remaining() >= prefix.len() && &self.buf[self.pos..self.pos + prefix.len()] == prefix
    }

    /// Advances past `prefix` if present, returning whether it matched.
    pub fn consume_prefix(&mut self, prefix: &[u8]) -> bool {
        if self.starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.require(n)?;
        let slice = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(slice)
    }

    fn read_uint(&mut self, width: usize) -> Result<u64> {
        self.require(width)?;
        let bytes = &self.buf[self.pos..self.pos + width];
        let mut v: u64 = 0;
        match self.endian {
            Endianness::Big => {
                for &b in bytes {
                    v = (v << 8) | b as u64;
                }
            }
            Endianness::Little => {
                for &b in bytes.iter().rev() {
                    v = (v << 8) | b as u64;
                }
            }
        }
        self.pos += width;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_uint(2)? as u16 as i16)
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(self.read_uint(3)? as u32)
    }

    pub fn read_i24(&mut self) -> Result<i32> {
        let v = self.read_uint(3)? as u32;
        // sign-extend from 24 bits
        Ok(((v << 8) as i32) >> 8)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_uint(4)? as u32 as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bits = self.read_uint(4)? as u32;
        Ok(f32::from_bits(bits))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bits = self.read_uint(8)?;
        Ok(f64::from_bits(bits))
    }

    pub fn read_utf8(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::Decode("invalid UTF-8".into()))
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(v: Vec<u8>) -> Self {
        ByteStream::new(v)
    }
}

impl From<&[u8]> for ByteStream {
    fn from(v: &[u8]) -> Self {
        ByteStream::new(Bytes::copy_from_slice(v))
    }
}

/// An append-only write buffer mirroring the read side's typed methods.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
    endian: Endianness,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            endian: Endianness::Big,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            endian: Endianness::Big,
        }
    }

    pub fn with_endian(endian: Endianness) -> Self {
        Self {
            buf: BytesMut::new(),
            endian,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    fn write_uint(&mut self, v: u64, width: usize) {
        let all = v.to_be_bytes();
        let be = &all[all.len() - width..];
        match self.endian {
            Endianness::Big => self.buf.put_slice(be),
            Endianness::Little => {
                let mut le = be.to_vec();
                le.reverse();
                self.buf.put_slice(&le);
            }
        }
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write_uint(v as u64, 2);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_uint(v as u16 as u64, 2);
    }

    pub fn write_u24(&mut self, v: u32) {
        self.write_uint(v as u64, 3);
    }

    pub fn write_i24(&mut self, v: i32) {
        self.write_uint((v & 0x00FF_FFFF) as u64, 3);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_uint(v as u64, 4);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_uint(v as u32 as u64, 4);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_uint(v.to_bits() as u64, 4);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_uint(v.to_bits(), 8);
    }

    pub fn write_utf8(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
    }

    /// Overwrites `width` bytes starting at `pos` with `v`, without moving
    /// the append cursor. Used by LSO framing to backfill the total-length
    /// field once the body size is known.
    pub fn patch_u32_at(&mut self, pos: usize, v: u32) {
        let bytes = v.to_be_bytes();
        self.buf[pos..pos + 4].copy_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_numeric_widths() {
        let mut w = ByteWriter::new();
        w.write_u8(0xAB);
        w.write_u16(0x1234);
        w.write_u24(0x00AABBCC);
        w.write_u32(0xDEADBEEF);
        w.write_f32(1.5);
        w.write_f64(2.5);
        let bytes = w.finish();

        let mut r = ByteStream::new(bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u24().unwrap(), 0x00AABBCC);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), 2.5);
    }

    #[test]
    fn negative_numbers_round_trip() {
        let mut w = ByteWriter::new();
        w.write_i16(-1);
        w.write_i24(-1);
        w.write_i32(-1);
        let bytes = w.finish();

        let mut r = ByteStream::new(bytes);
        assert_eq!(r.read_i16().unwrap(), -1);
        assert_eq!(r.read_i24().unwrap(), -1);
        assert_eq!(r.read_i32().unwrap(), -1);
    }

    #[test]
    fn seek_restores_checkpointed_position() {
        let mut r = ByteStream::new(vec![1, 2, 3, 4]);
        let checkpoint = r.position();
        r.read_u16().unwrap();
        r.seek(checkpoint);
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u8().unwrap(), 1);
    }

    #[test]
    fn short_read_is_end_of_stream() {
        let mut r = ByteStream::new(vec![1, 2]);
        assert!(matches!(r.read_u32(), Err(AmfError::EndOfStream)));
    }

    #[test]
    fn consume_prefix_matches_and_advances() {
        let mut r = ByteStream::new(b"TCSO\x00\x04rest".to_vec());
        assert!(r.consume_prefix(b"TCSO\x00\x04"));
        assert_eq!(r.read_utf8(4).unwrap(), "rest");
    }

    #[test]
    fn patch_backfills_without_moving_cursor() {
        let mut w = ByteWriter::new();
        w.write_u32(0);
        let reserved = 0;
        w.write_u8(0xFF);
        w.patch_u32_at(reserved, 42);
        let bytes = w.finish();
        let mut r = ByteStream::new(bytes);
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_u8().unwrap(), 0xFF);
    }
}
