//! Bounds-checked cursor over a raw trace buffer
//!
//! Every decoder reads device captures through [`ByteReader`]. All reads
//! are checked against the buffer bound before the cursor moves: a failed
//! read returns [`TraceError::OutOfBounds`] and leaves the cursor exactly
//! where it was, so a decoder can report the precise offset of a
//! structural violation.
//!
//! Endianness is always explicit. Device captures are little-endian on
//! the supported targets, but export formats (BTSnoop) are big-endian,
//! so the reader takes the byte order per call instead of baking one in.

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};

/// Byte order for multi-byte integer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Endian {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

/// Cursor over an immutable byte buffer with bounds-checked reads
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a buffer with the cursor at offset 0
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the cursor has reached the end of the buffer
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, wanted: usize) -> Result<()> {
        if self.pos + wanted > self.buf.len() {
            return Err(TraceError::OutOfBounds {
                offset: self.pos,
                wanted,
                len: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Advance the cursor by `n` bytes without reading
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read the next byte without advancing the cursor
    pub fn peek_u8(&self) -> Result<u8> {
        self.check(1)?;
        Ok(self.buf[self.pos])
    }

    /// Borrow the next `n` bytes without advancing the cursor
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        Ok(&self.buf[self.pos..self.pos + n])
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit integer in the given byte order
    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        let bytes: [u8; 2] = self.read_array()?;
        Ok(match endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    /// Read a 32-bit integer in the given byte order
    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        let bytes: [u8; 4] = self.read_array()?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    /// Read a 64-bit integer in the given byte order
    pub fn read_u64(&mut self, endian: Endian) -> Result<u64> {
        let bytes: [u8; 8] = self.read_array()?;
        Ok(match endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    /// Read a fixed-size struct as a byte array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.check(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Borrow the next `n` bytes and advance the cursor past them
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(n)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Read a blob prefixed by a 32-bit length in the given byte order
    ///
    /// The whole blob (prefix plus payload) is validated before the
    /// cursor moves, so a length field pointing past the end of the
    /// buffer fails without a partial advance.
    pub fn read_blob(&mut self, endian: Endian) -> Result<&'a [u8]> {
        let prefix = self.peek_bytes(4)?;
        let len = match endian {
            Endian::Little => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
            Endian::Big => u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
        } as usize;
        self.check(4 + len)?;
        self.pos += 4;
        let blob = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(blob)
    }
}
