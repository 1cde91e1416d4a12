//! Fixed-size file header
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! [8s magic][u16 version][u32 row_count][u32 column_count]
//! [u64 data_start][u64 data_end][u64 trailer_end]
//! ```

use crate::{RowpackError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Magic literal at the start of every rowpack file
pub const MAGIC: &[u8; 8] = b"AMBRMPDF";

/// Format version written by this crate
pub const VERSION: u16 = 2;

/// Encoded size of [`Header`] in bytes
pub const HEADER_SIZE: usize = 8 + 2 + 4 + 4 + 8 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub row_count: u32,
    pub column_count: u32,
    pub data_start: u64,
    pub data_end: u64,
    pub trailer_end: u64,
}

impl Default for Header {
    fn default() -> Self {
        Self::provisional()
    }
}

impl Header {
    /// Header written when a file is created, before any offsets are known
    pub fn provisional() -> Self {
        Self {
            version: VERSION,
            row_count: 0,
            column_count: 0,
            data_start: 0,
            data_end: 0,
            trailer_end: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16(self.version);
        buf.put_u32(self.row_count);
        buf.put_u32(self.column_count);
        buf.put_u64(self.data_start);
        buf.put_u64(self.data_end);
        buf.put_u64(self.trailer_end);

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `bytes`
    ///
    /// Unknown versions are accepted; callers that care check `version`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RowpackError::format(format!(
                "Truncated header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(RowpackError::format(format!(
                "Bad magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(&magic)
            )));
        }

        Ok(Self {
            version: buf.get_u16(),
            row_count: buf.get_u32(),
            column_count: buf.get_u32(),
            data_start: buf.get_u64(),
            data_end: buf.get_u64(),
            trailer_end: buf.get_u64(),
        })
    }

    /// Check `HEADER_SIZE <= data_start <= data_end <= trailer_end <= file_size`
    ///
    /// A header still carrying its provisional zero offsets fails here, which
    /// is how a file whose writer never closed is told apart from a complete one.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        if self.data_start < HEADER_SIZE as u64 {
            return Err(RowpackError::format(format!(
                "Incomplete file: data section starts at {}, before end of header; \
                 the writer was probably never closed",
                self.data_start
            )));
        }
        if self.data_start > self.data_end || self.data_end > self.trailer_end {
            return Err(RowpackError::format(format!(
                "Offsets out of order: data_start={}, data_end={}, trailer_end={}",
                self.data_start, self.data_end, self.trailer_end
            )));
        }
        if self.trailer_end > file_size {
            return Err(RowpackError::format(format!(
                "Truncated file: trailer ends at {} but file is {} bytes",
                self.trailer_end, file_size
            )));
        }
        Ok(())
    }

    pub fn trailer_len(&self) -> u64 {
        self.trailer_end - self.data_end
    }
}
