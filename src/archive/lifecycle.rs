//! Opening and closing archive directories.
//!
//! Responsibilities:
//! - Read `meta.json` and reject foreign or newer archives before touching the body.
//! - Map `archive.bin` read-only and decode the header once.
//! - Pair the optional vector store and key index, checking their archive GUID.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use memmap2::Mmap;
use serde_json::Value;

use crate::archive::document::Document;
use crate::archive::iter::DocumentIter;
use crate::constants::{
    ARCHIVE_FILE, ARCHIVE_TYPE, ENGINE, FORMAT_VERSION, INDEX_FILE, META_FILE, VECTORS_FILE,
};
use crate::error::{ArribaError, Result};
use crate::io::block::BlockLayout;
use crate::io::header::HeaderCodec;
use crate::io::key_index::KeyIndex;
use crate::io::vectors::{VectorStore, peek_guid};
use crate::selection::{Selection, TagRegistry};
use crate::types::{
    ArchiveHeader, ArchiveMeta, CodeMeta, IterOptions, OpenReadOptions, TaggerSummary,
};

/// Read-only handle on an archive directory.
///
/// Holds the mapping of `archive.bin` and the decoded header. Documents borrow from the
/// handle, so [`Archive::close`] cannot be called while any of them is alive.
pub struct Archive {
    pub(crate) path: PathBuf,
    pub(crate) meta: ArchiveMeta,
    pub(crate) mmap: Mmap,
    pub(crate) header: ArchiveHeader,
    pub(crate) data_start: usize,
    pub(crate) vectors: Option<VectorStore>,
    pub(crate) key_index: Option<KeyIndex>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("guid", &self.meta.guid)
            .field("documents", &self.header.documents.len())
            .field("codes", &self.header.codes.len())
            .finish_non_exhaustive()
    }
}

impl Archive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: OpenReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |reason: &str| ArribaError::InvalidArchive {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if !path.is_dir() {
            return Err(invalid("not an archive directory"));
        }

        let meta: ArchiveMeta =
            serde_json::from_str(&fs_err::read_to_string(path.join(META_FILE))?)?;
        if meta.kind != ARCHIVE_TYPE {
            return Err(invalid(&format!("type is '{}', not '{ARCHIVE_TYPE}'", meta.kind)));
        }
        if meta.engine != ENGINE {
            return Err(invalid(&format!("engine is '{}', not '{ENGINE}'", meta.engine)));
        }
        if meta.version != FORMAT_VERSION {
            return Err(ArribaError::FormatVersion {
                found: meta.version,
                expected: FORMAT_VERSION,
            });
        }

        let file = fs_err::File::open(path.join(ARCHIVE_FILE))?;
        // Safety: read-only mapping; archives are never mutated after finalize.
        let mmap = unsafe { Mmap::map(file.file())? };
        let (header, data_start) = HeaderCodec::read(&mmap)?;

        let vectors_path = path.join(VECTORS_FILE);
        let vectors = if !vectors_path.exists() {
            None
        } else if options.load_vectors {
            Some(VectorStore::open(&vectors_path, &meta.guid)?)
        } else {
            let stamped = peek_guid(&vectors_path)?;
            if stamped != meta.guid {
                return Err(ArribaError::ArchiveGuidMismatch {
                    archive: meta.guid,
                    vectors: stamped,
                });
            }
            None
        };

        let index_path = path.join(INDEX_FILE);
        let key_index = if options.load_key_index && index_path.exists() {
            Some(KeyIndex::read(&index_path, &meta.guid)?)
        } else {
            None
        };

        tracing::debug!(
            archive.path = %path.display(),
            archive.guid = %meta.guid,
            archive.documents = header.documents.len(),
            archive.taggers = header.taggers.len(),
            archive.codes = header.codes.len(),
            archive.vectors = vectors.is_some(),
            "archive opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            mmap,
            header,
            data_start,
            vectors,
            key_index,
        })
    }

    /// Releases the mapping. Taking `self` by value means no document view can outlive it.
    pub fn close(self) {
        tracing::debug!(archive.path = %self.path.display(), "archive closed");
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn guid(&self) -> &str {
        &self.meta.guid
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.header.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.documents.is_empty()
    }

    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[must_use]
    pub fn codes(&self) -> &[CodeMeta] {
        &self.header.codes
    }

    /// Tagger signatures with the names of the tags each contributed.
    #[must_use]
    pub fn taggers(&self) -> &[TaggerSummary] {
        &self.meta.taggers
    }

    #[must_use]
    pub fn vectors(&self) -> Option<&VectorStore> {
        self.vectors.as_ref()
    }

    /// Resolves a selection against this archive's dictionaries.
    pub fn select(&self, selection: &Selection) -> Result<Rc<TagRegistry>> {
        Ok(Rc::new(selection.resolve(&self.header)?))
    }

    /// Lazily iterates every document under `selection`.
    pub fn iter(&self, selection: &Selection) -> Result<DocumentIter<'_>> {
        self.iter_with(selection, IterOptions::default())
    }

    pub fn iter_with(
        &self,
        selection: &Selection,
        options: IterOptions,
    ) -> Result<DocumentIter<'_>> {
        let registry = self.select(selection)?;
        Ok(DocumentIter::new(self, registry, options))
    }

    /// Opens document `index` under an already resolved selection.
    pub fn document(&self, index: usize, registry: &Rc<TagRegistry>) -> Result<Document<'_>> {
        let layout = self.layout(index)?;
        Ok(Document::new(self, index, layout, Rc::clone(registry)))
    }

    pub(crate) fn layout(&self, index: usize) -> Result<BlockLayout<'_>> {
        let range = self.header.documents.get(index).ok_or_else(|| {
            ArribaError::decoding(index, format!("archive holds {} documents", self.len()))
        })?;
        // Ranges were checked against the data region when the header was read.
        let start = self.data_start + range.start as usize;
        let end = self.data_start + range.end as usize;
        BlockLayout::parse(&self.mmap[start..end], index, self.header.codes.len())
    }

    /// Documents whose external key equals `key`.
    pub fn find_by_key(&self, key: &Value) -> Result<Vec<usize>> {
        self.key_index()?.find_key(key)
    }

    /// Documents whose text equals `text`.
    pub fn find_by_text(&self, text: &str) -> Result<Vec<usize>> {
        let mut found = Vec::new();
        for candidate in self.key_index()?.text_candidates(text) {
            if self.layout(candidate)?.text() == text {
                found.push(candidate);
            }
        }
        Ok(found)
    }

    fn key_index(&self) -> Result<&KeyIndex> {
        self.key_index
            .as_ref()
            .ok_or_else(|| ArribaError::InvalidArchive {
                path: self.path.clone(),
                reason: "no key index loaded".to_string(),
            })
    }
}
