//! Little-endian cursor over a borrowed byte range.
//!
//! Every read is bounds-checked against the slice the cursor was created from, so a
//! truncated or corrupt block fails with a [`ArribaError::Decoding`] naming the document
//! instead of reading past its range.

use crate::error::{ArribaError, Result};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    document: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], document: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            document,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> ArribaError {
        ArribaError::decoding(self.document, reason)
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                tracing::error!(
                    block.document = self.document,
                    block.position = self.pos,
                    block.wanted = len,
                    block.len = self.bytes.len(),
                    "document block truncated"
                );
                self.error(format!(
                    "truncated {what}: need {len} bytes at offset {}, block has {}",
                    self.pos,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a `u32` length prefix followed by that many bytes.
    pub(crate) fn read_prefixed(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.read_u32(what)? as usize;
        self.take(len, what)
    }
}

pub(crate) trait ByteSink {
    fn put_u8(&mut self, value: u8);
    fn put_u32(&mut self, value: u32);
    fn put_prefixed(&mut self, bytes: &[u8]) -> Result<()>;
}

impl ByteSink for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_prefixed(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| ArribaError::EncodingRange {
            value: bytes.len() as u64,
            max_bits: 32,
        })?;
        self.put_u32(len);
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Reads `u32` at `index` of a little-endian `u32` table. Callers bound-check first.
#[inline]
pub(crate) fn u32_at(bytes: &[u8], index: usize) -> u32 {
    let at = index * 4;
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
