//! Builder-style options for writing, opening and iterating archives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArribaError, Result};

fn default_true() -> bool {
    true
}

/// Tunable options for [`crate::ArchiveWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterOptions {
    /// Replace an existing archive at the output path instead of failing.
    #[serde(default)]
    pub overwrite: bool,
    /// Write producer vectors to the paired vector store. When disabled, vectors in the
    /// input are validated but dropped.
    #[serde(default = "default_true")]
    pub vectors: bool,
    /// Maintain the external-key and text-fingerprint index.
    #[serde(default = "default_true")]
    pub key_index: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            vectors: true,
            key_index: true,
        }
    }
}

impl WriterOptions {
    /// Start a fluent builder for `WriterOptions`.
    #[must_use]
    pub fn builder() -> WriterOptionsBuilder {
        WriterOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriterOptionsBuilder {
    inner: WriterOptions,
}

impl WriterOptionsBuilder {
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.inner.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn vectors(mut self, enabled: bool) -> Self {
        self.inner.vectors = enabled;
        self
    }

    #[must_use]
    pub fn key_index(mut self, enabled: bool) -> Self {
        self.inner.key_index = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> WriterOptions {
        self.inner
    }
}

/// Controls which sidecar files [`crate::Archive::open_with`] loads.
///
/// A present vector store is always checked against the archive GUID, even when
/// `load_vectors` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenReadOptions {
    pub load_vectors: bool,
    pub load_key_index: bool,
}

impl Default for OpenReadOptions {
    fn default() -> Self {
        Self {
            load_vectors: true,
            load_key_index: true,
        }
    }
}

/// Per-iteration knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterOptions {
    pub slice: Option<Slice>,
}

impl IterOptions {
    #[must_use]
    pub fn slice(mut self, slice: Slice) -> Self {
        self.slice = Some(slice);
        self
    }
}

/// Round-robin partition `index/count` of an archive's documents, used to split a pass
/// over several workers. Document `k` belongs to slice `1 + k % count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    index: usize,
    count: usize,
}

impl Slice {
    /// `index` is 1-based.
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count < 2 {
            return Err(ArribaError::InvalidSlice {
                reason: format!("slice count must be at least 2, got {count}"),
            });
        }
        if index == 0 || index > count {
            return Err(ArribaError::InvalidSlice {
                reason: format!("slice index must be in 1..={count}, got {index}"),
            });
        }
        Ok(Self { index, count })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn contains(&self, document: usize) -> bool {
        1 + document % self.count == self.index
    }
}

impl FromStr for Slice {
    type Err = ArribaError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ArribaError::InvalidSlice {
            reason: format!("expected 'i/n', got '{s}'"),
        };
        let (index, count) = s.split_once('/').ok_or_else(invalid)?;
        let index = index.trim().parse::<usize>().map_err(|_| invalid())?;
        let count = count.trim().parse::<usize>().map_err(|_| invalid())?;
        Self::new(index, count)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_defaults_and_builder() {
        let defaults = WriterOptions::default();
        assert!(!defaults.overwrite);
        assert!(defaults.vectors);
        assert!(defaults.key_index);

        let opts = WriterOptions::builder()
            .overwrite(true)
            .key_index(false)
            .build();
        assert!(opts.overwrite);
        assert!(opts.vectors);
        assert!(!opts.key_index);
    }

    #[test]
    fn slices_partition_documents() {
        let slices: Vec<Slice> = ["1/3", "2/3", "3/3"]
            .iter()
            .map(|s| s.parse().expect("slice"))
            .collect();
        for document in 0..30 {
            let owners = slices.iter().filter(|s| s.contains(document)).count();
            assert_eq!(owners, 1, "document {document}");
        }
        assert!(slices[0].contains(0));
        assert!(slices[1].contains(4));
        assert_eq!(slices[2].to_string(), "3/3");
    }

    #[test]
    fn rejects_malformed_slices() {
        for bad in ["1/1", "0/2", "3/2", "2", "a/b", ""] {
            match bad.parse::<Slice>() {
                Err(ArribaError::InvalidSlice { .. }) => {}
                other => panic!("'{bad}' should be rejected, got {other:?}"),
            }
        }
    }
}
