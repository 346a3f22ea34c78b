//! Encoding and validation of the `archive.bin` header.
//!
//! `archive.bin` starts with a `u64` little-endian header length, followed by the
//! bincode-encoded [`ArchiveHeader`], followed by the document data region. Document
//! ranges in the header are relative to the start of that region.

use std::io::Write;

use bincode::serde::{decode_from_slice, encode_to_vec};

use crate::constants::{FORMAT_VERSION, HEADER_LEN_PREFIX};
use crate::error::{ArribaError, Result};
use crate::io::bincode_config;
use crate::types::ArchiveHeader;

pub struct HeaderCodec;

impl HeaderCodec {
    /// Writes the length prefix and the header, returning the bytes written.
    pub fn write<W: Write>(mut writer: W, header: &ArchiveHeader) -> Result<u64> {
        let bytes = encode_to_vec(header, bincode_config())?;
        writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&bytes)?;
        Ok((HEADER_LEN_PREFIX + bytes.len()) as u64)
    }

    /// Decodes and validates the header at the front of `bytes`. Returns the header and the
    /// offset where the document data region starts.
    pub fn read(bytes: &[u8]) -> Result<(ArchiveHeader, usize)> {
        let prefix: [u8; HEADER_LEN_PREFIX] = bytes
            .get(..HEADER_LEN_PREFIX)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| ArribaError::InvalidHeader {
                reason: format!("file of {} bytes has no header length", bytes.len()),
            })?;
        let header_len = u64::from_le_bytes(prefix);
        let data_start = usize::try_from(header_len)
            .ok()
            .and_then(|len| len.checked_add(HEADER_LEN_PREFIX))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                tracing::error!(
                    archive.header_len = header_len,
                    archive.file_len = bytes.len(),
                    "header length exceeds file"
                );
                ArribaError::InvalidHeader {
                    reason: format!(
                        "header length {header_len} exceeds file of {} bytes",
                        bytes.len()
                    ),
                }
            })?;

        let (header, consumed): (ArchiveHeader, usize) =
            decode_from_slice(&bytes[HEADER_LEN_PREFIX..data_start], bincode_config())?;
        if consumed != data_start - HEADER_LEN_PREFIX {
            return Err(ArribaError::InvalidHeader {
                reason: format!(
                    "header decoded from {consumed} of {} bytes",
                    data_start - HEADER_LEN_PREFIX
                ),
            });
        }
        if header.version != FORMAT_VERSION {
            return Err(ArribaError::FormatVersion {
                found: header.version,
                expected: FORMAT_VERSION,
            });
        }
        Self::validate(&header, (bytes.len() - data_start) as u64)?;
        Ok((header, data_start))
    }

    /// Checks dictionary cross-references and document ranges against the data region.
    pub fn validate(header: &ArchiveHeader, data_len: u64) -> Result<()> {
        let invalid = |reason: String| ArribaError::InvalidHeader { reason };

        for (index, code) in header.codes.iter().enumerate() {
            let tagger = header.taggers.get(code.tagger as usize).ok_or_else(|| {
                invalid(format!(
                    "code {index} references tagger {} of {}",
                    code.tagger,
                    header.taggers.len()
                ))
            })?;
            if !tagger.codes.contains(&(index as u32)) {
                return Err(invalid(format!(
                    "tagger {} does not list its code {index}",
                    code.tagger
                )));
            }
        }
        for (index, tagger) in header.taggers.iter().enumerate() {
            for &code in &tagger.codes {
                let owner = header.codes.get(code as usize).map(|meta| meta.tagger);
                if owner != Some(index as u32) {
                    return Err(invalid(format!(
                        "tagger {index} lists code {code} it does not own"
                    )));
                }
            }
        }
        let mut previous_end = 0;
        for (index, document) in header.documents.iter().enumerate() {
            if document.start > document.end || document.end > data_len {
                return Err(invalid(format!(
                    "document {index} range {}..{} outside data region of {data_len} bytes",
                    document.start, document.end
                )));
            }
            if document.start < previous_end {
                return Err(invalid(format!(
                    "document {index} range {}..{} overlaps the previous document ending at {previous_end}",
                    document.start, document.end
                )));
            }
            previous_end = document.end;
        }
        Ok(())
    }
}
