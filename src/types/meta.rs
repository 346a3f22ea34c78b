//! Archive-level dictionaries: the binary header and the `meta.json` sidecar.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{ARCHIVE_TYPE, ENGINE, FORMAT_VERSION};
use crate::error::Result;

/// One annotation producer. `signature` is the producer's structured signature, kept as
/// canonical (key-sorted, compact) JSON so that structurally equal signatures compare equal
/// as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggerMeta {
    pub signature: String,
    pub codes: Vec<u32>,
}

impl TaggerMeta {
    pub fn signature_value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.signature)?)
    }
}

/// A named annotation kind scoped to one tagger, with its label-value dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMeta {
    pub tagger: u32,
    pub name: String,
    pub values: Vec<String>,
}

/// Byte range of one document block, relative to the start of the document data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub start: u64,
    pub end: u64,
}

impl DocumentRef {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Header stored at the front of `archive.bin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub version: u32,
    pub taggers: Vec<TaggerMeta>,
    pub codes: Vec<CodeMeta>,
    pub documents: Vec<DocumentRef>,
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            taggers: Vec::new(),
            codes: Vec::new(),
            documents: Vec::new(),
        }
    }
}

/// Tagger entry of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggerSummary {
    pub signature: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Contents of `meta.json`, read before the binary body is mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub engine: String,
    pub version: u32,
    pub guid: String,
    #[serde(default)]
    pub taggers: Vec<TaggerSummary>,
}

impl ArchiveMeta {
    #[must_use]
    pub fn new(guid: String, taggers: Vec<TaggerSummary>) -> Self {
        Self {
            kind: ARCHIVE_TYPE.to_string(),
            engine: ENGINE.to_string(),
            version: FORMAT_VERSION,
            guid,
            taggers,
        }
    }
}
