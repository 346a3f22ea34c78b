//! Append-only staging log for encoded document blocks.
//!
//! The writer appends each block as soon as its document is encoded, so memory holds one
//! document at a time. On finalize the log is scanned back in order and copied behind the
//! header, checking every record's checksum and document index on the way.

use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs_err::{File, OpenOptions};

use crate::error::{ArribaError, Result};

// Each record header: [document: u64][len: u32][reserved: 4 bytes][checksum: 32 bytes]
const RECORD_HEADER_SIZE: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingStats {
    pub records: u64,
    pub payload_bytes: u64,
}

#[derive(Debug)]
pub struct StagingLog {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
    payload_bytes: u64,
}

impl StagingLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        tracing::debug!(staging.path = %path.display(), "staging log created");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
            payload_bytes: 0,
        })
    }

    /// Appends the block of the next document. Returns its document index.
    pub fn append_block(&mut self, payload: &[u8]) -> Result<u64> {
        let len = u32::try_from(payload.len()).map_err(|_| ArribaError::EncodingRange {
            value: payload.len() as u64,
            max_bits: 32,
        })?;
        let document = self.records;
        let digest = blake3::hash(payload);
        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[..8].copy_from_slice(&document.to_le_bytes());
        header[8..12].copy_from_slice(&len.to_le_bytes());
        header[16..48].copy_from_slice(digest.as_bytes());

        tracing::trace!(
            staging.document = document,
            staging.payload_len = payload.len(),
            "staging append block"
        );
        self.writer.write_all(&header)?;
        self.writer.write_all(payload)?;
        self.records += 1;
        self.payload_bytes += u64::from(len);
        Ok(document)
    }

    #[must_use]
    pub fn stats(&self) -> StagingStats {
        StagingStats {
            records: self.records,
            payload_bytes: self.payload_bytes,
        }
    }

    /// Copies every staged payload, in document order, to `out`. Returns the bytes copied.
    pub fn drain_into<W: Write>(mut self, out: &mut W) -> Result<u64> {
        self.writer.flush()?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|err| ArribaError::Io(err.into_error()))?;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut offset = 0u64;
        let mut copied = 0u64;
        let mut payload = Vec::new();
        for expected in 0..self.records {
            let mut header = [0u8; RECORD_HEADER_SIZE];
            reader.read_exact(&mut header)?;
            let document = header
                .get(..8)
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map_or(u64::MAX, u64::from_le_bytes);
            let length = header
                .get(8..12)
                .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
                .map_or(0, u32::from_le_bytes);
            if document != expected {
                tracing::error!(
                    staging.offset = offset,
                    staging.document = document,
                    staging.expected = expected,
                    "staging record out of order"
                );
                return Err(ArribaError::StagingCorruption {
                    offset,
                    reason: format!("record for document {document}, expected {expected}"),
                });
            }

            payload.resize(length as usize, 0);
            reader.read_exact(&mut payload)?;
            if blake3::hash(&payload).as_bytes() != &header[16..48] {
                return Err(ArribaError::StagingCorruption {
                    offset,
                    reason: format!("checksum mismatch for document {document}"),
                });
            }
            out.write_all(&payload)?;
            offset += RECORD_HEADER_SIZE as u64 + u64::from(length);
            copied += u64::from(length);
        }
        tracing::debug!(
            staging.path = %self.path.display(),
            staging.records = self.records,
            staging.bytes = copied,
            "staging log drained"
        );
        Ok(copied)
    }
}
