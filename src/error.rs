//! Error type shared by the reader, writer and codecs.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArribaError>;

#[derive(Debug, Error)]
pub enum ArribaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("deserialization failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("unsupported archive format version {found} (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },

    #[error("vector store belongs to archive {vectors}, not {archive}")]
    ArchiveGuidMismatch { archive: String, vectors: String },

    #[error("value {value} does not fit the widest allowed packed width ({max_bits} bits)")]
    EncodingRange { value: u64, max_bits: u32 },

    #[error("invalid span [{start}, {end}): {reason}")]
    InvalidSpan {
        start: usize,
        end: usize,
        reason: &'static str,
    },

    #[error("invalid parent {parent} for entry {entry} of tag '{tag}' ({len} entries)")]
    InvalidParent {
        tag: String,
        entry: usize,
        parent: usize,
        len: usize,
    },

    #[error("tag '{tag}' of tagger {tagger} appears twice in one document")]
    DuplicateTag { tagger: usize, tag: String },

    #[error("no tag named '{name}'")]
    UnknownTag { name: String },

    #[error("error while reading document {document}: {reason}")]
    Decoding { document: usize, reason: String },

    #[error("ambiguous tag name '{name}', use an explicit selection")]
    AmbiguousSelection { name: String },

    #[error("'{spec}' is not a valid tag specification")]
    InvalidTagSpec { spec: String },

    #[error("invalid slice: {reason}")]
    InvalidSlice { reason: String },

    #[error("invalid archive header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid archive at {path:?}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("{path:?} already exists")]
    ArchiveExists { path: PathBuf },

    #[error("staging log corrupted at offset {offset}: {reason}")]
    StagingCorruption { offset: u64, reason: String },

    #[error("invalid vector data: {reason}")]
    InvalidVector { reason: String },
}

impl ArribaError {
    pub(crate) fn decoding(document: usize, reason: impl Into<String>) -> Self {
        Self::Decoding {
            document,
            reason: reason.into(),
        }
    }
}
