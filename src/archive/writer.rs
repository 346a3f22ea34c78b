//! Streaming archive writer.
//!
//! Documents are validated and encoded one at a time, their blocks appended to a staging
//! log inside a temporary directory created next to the output path. `finalize` writes the
//! header and sidecars into that directory and renames it into place, so a failed write
//! never leaves a partial archive behind.

use std::collections::{HashMap, HashSet};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;
use uuid::Uuid;

use crate::constants::{ARCHIVE_FILE, INDEX_FILE, META_FILE, STAGING_PREFIX, VECTORS_FILE};
use crate::error::{ArribaError, Result};
use crate::io::block::{CodeData, LabelBlock, encode_block};
use crate::io::header::HeaderCodec;
use crate::io::key_index::KeyIndexBuilder;
use crate::io::staging::StagingLog;
use crate::io::vectors::VectorStoreWriter;
use crate::span::{SortedSpans, SpanId, SpanTable};
use crate::text::CharOffsets;
use crate::types::{
    ArchiveHeader, ArchiveMeta, CodeMeta, DocumentInput, DocumentRef, LabelInput, TaggerMeta,
    TaggerSummary, WriterOptions,
};

const BLOCKS_LOG: &str = "blocks.log";
const VECTORS_SCRATCH: &str = "vectors.scratch";

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArribaError::EncodingRange {
        value: value as u64,
        max_bits: 32,
    })
}

/// Builds an archive directory from a stream of producer documents.
///
/// Only the running dictionaries and the document being added are held in memory.
/// Dropping the writer without calling [`ArchiveWriter::finalize`] removes the staging
/// directory and leaves the output path untouched.
#[derive(Debug)]
pub struct ArchiveWriter {
    path: PathBuf,
    options: WriterOptions,
    staging: TempDir,
    blocks: StagingLog,
    vectors: Option<VectorStoreWriter>,
    keys: Option<KeyIndexBuilder>,
    header: ArchiveHeader,
    tagger_ids: HashMap<String, u32>,
    code_ids: HashMap<(u32, String), u32>,
    value_ids: Vec<HashMap<String, u32>>,
    data_len: u64,
}

/// One tag of one document after validation, before anything is interned.
struct PreparedTag<'i> {
    signature: String,
    name: &'i str,
    entries: Vec<PreparedEntry<'i>>,
    vectors: Vec<(&'i str, &'i [Vec<f32>])>,
}

struct PreparedEntry<'i> {
    span: Option<SpanId>,
    labels: &'i [LabelInput],
    parent: Option<usize>,
}

/// On-disk entry order of a prepared tag.
struct EntryOrder {
    /// Input positions in on-disk order.
    order: Vec<usize>,
    /// On-disk position of every input position.
    position: Vec<usize>,
    /// Sorted span index per on-disk entry, `None` for document-level entries.
    spans: Vec<Option<usize>>,
}

impl EntryOrder {
    fn new(tag: &PreparedTag<'_>, sorted: &SortedSpans, chars: &CharOffsets) -> Result<Self> {
        let mut keyed: Vec<(Option<usize>, usize)> = tag
            .entries
            .iter()
            .enumerate()
            .map(|(input, entry)| (entry.span.map(|id| sorted.remap(id)), input))
            .collect();
        keyed.sort_by_key(|&(span, input)| (span.is_some(), span, input));
        for pair in keyed.windows(2) {
            if let (Some(left), Some(right)) = (pair[0].0, pair[1].0) {
                if left == right {
                    let (start, end) = sorted.lookup(left);
                    return Err(ArribaError::InvalidSpan {
                        start: chars.char_index(start).unwrap_or(start),
                        end: chars.char_index(end).unwrap_or(end),
                        reason: "span tagged twice by one tag",
                    });
                }
            }
        }
        let mut position = vec![0; keyed.len()];
        for (at, &(_, input)) in keyed.iter().enumerate() {
            position[input] = at;
        }
        Ok(Self {
            order: keyed.iter().map(|&(_, input)| input).collect(),
            position,
            spans: keyed.iter().map(|&(span, _)| span).collect(),
        })
    }
}

impl ArchiveWriter {
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() && !options.overwrite {
            return Err(ArribaError::ArchiveExists { path });
        }
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs_err::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)?;
        let blocks = StagingLog::create(&staging.path().join(BLOCKS_LOG))?;
        let vectors = if options.vectors {
            Some(VectorStoreWriter::create(
                &staging.path().join(VECTORS_SCRATCH),
            )?)
        } else {
            None
        };
        let keys = options.key_index.then(KeyIndexBuilder::default);
        tracing::debug!(
            archive.path = %path.display(),
            staging.path = %staging.path().display(),
            "archive writer created"
        );
        Ok(Self {
            path,
            options,
            staging,
            blocks,
            vectors,
            keys,
            header: ArchiveHeader::default(),
            tagger_ids: HashMap::new(),
            code_ids: HashMap::new(),
            value_ids: Vec::new(),
            data_len: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn options(&self) -> WriterOptions {
        self.options
    }

    /// Documents added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.documents.is_empty()
    }

    /// Validates, encodes and stages one document. Returns its index.
    ///
    /// Validation happens before any dictionary is touched: a document rejected with
    /// `InvalidSpan`, `InvalidParent`, `DuplicateTag`, `UnknownTag` or `InvalidVector`
    /// leaves the writer as it was, and the caller may skip it and continue.
    pub fn add_document(&mut self, input: &DocumentInput) -> Result<usize> {
        let document = self.header.documents.len();
        let chars = CharOffsets::new(&input.text);
        let mut table = SpanTable::new();
        let (signatures, tags) = prepare_tags(input, &chars, &mut table)?;
        let sorted = table.finalize();
        let orders = tags
            .iter()
            .map(|tag| EntryOrder::new(tag, &sorted, &chars))
            .collect::<Result<Vec<_>>>()?;
        let meta = match &input.meta {
            Some(meta) => serde_json::to_vec(meta)?,
            None => Vec::new(),
        };

        // Taggers that declare no tags are still listed in the header.
        for signature in &signatures {
            self.intern_tagger(signature)?;
        }
        let mut encoded = Vec::with_capacity(tags.len());
        let mut vectors = Vec::new();
        for (tag, order) in tags.iter().zip(&orders) {
            let tagger = self.intern_tagger(&tag.signature)?;
            let code = self.intern_code(tagger, tag.name)?;
            if tag.entries.is_empty() {
                // Declared but unused: the code is known to readers, the block stays lean.
                continue;
            }
            let mut labels = Vec::with_capacity(tag.entries.len());
            for entry in &tag.entries {
                let mut interned = Vec::with_capacity(entry.labels.len());
                for label in entry.labels {
                    interned.push((self.intern_value(code, &label.value)?, label.score));
                }
                labels.push(interned);
            }
            let labels: Vec<_> = order
                .order
                .iter()
                .map(|&input| std::mem::take(&mut labels[input]))
                .collect();
            let has_parents = tag.entries.iter().any(|entry| entry.parent.is_some());
            let parents = has_parents.then(|| {
                order
                    .order
                    .iter()
                    .map(|&input| {
                        tag.entries[input]
                            .parent
                            .map_or(0, |parent| order.position[parent] as u64 + 1)
                    })
                    .collect()
            });
            let data = CodeData {
                doc_entries: to_u32(order.spans.iter().filter(|span| span.is_none()).count())?,
                span_refs: order.spans.iter().flatten().map(|&span| span as u64).collect(),
                labels: LabelBlock::from_entries(&labels),
                parents,
            };
            encoded.push((code, data));
            for &(stream, rows) in &tag.vectors {
                let rows: Vec<&[f32]> = order.order.iter().map(|&input| rows[input].as_slice()).collect();
                vectors.push((code, stream, rows));
            }
        }
        encoded.sort_by_key(|(code, _)| *code);
        vectors.sort_by(|left, right| (left.0, left.1).cmp(&(right.0, right.1)));

        let block = encode_block(&input.text, &meta, &sorted, &encoded)?;
        self.blocks.append_block(&block)?;
        let len = block.len() as u64;
        self.header.documents.push(DocumentRef {
            start: self.data_len,
            end: self.data_len + len,
        });
        self.data_len += len;

        if let Some(writer) = self.vectors.as_mut() {
            for (code, stream, rows) in &vectors {
                writer.add(document as u64, *code, stream, rows)?;
            }
        }
        if let Some(keys) = self.keys.as_mut() {
            keys.add(to_u32(document)?, &input.text, input.external_key.as_ref())?;
        }
        tracing::trace!(
            archive.document = document,
            archive.spans = sorted.len(),
            archive.tags = encoded.len(),
            archive.block_len = len,
            "document staged"
        );
        Ok(document)
    }

    fn intern_tagger(&mut self, signature: &str) -> Result<u32> {
        if let Some(&id) = self.tagger_ids.get(signature) {
            return Ok(id);
        }
        let id = to_u32(self.header.taggers.len())?;
        self.header.taggers.push(TaggerMeta {
            signature: signature.to_string(),
            codes: Vec::new(),
        });
        self.tagger_ids.insert(signature.to_string(), id);
        Ok(id)
    }

    fn intern_code(&mut self, tagger: u32, name: &str) -> Result<u32> {
        let key = (tagger, name.to_string());
        if let Some(&id) = self.code_ids.get(&key) {
            return Ok(id);
        }
        let id = to_u32(self.header.codes.len())?;
        self.header.codes.push(CodeMeta {
            tagger,
            name: name.to_string(),
            values: Vec::new(),
        });
        self.header.taggers[tagger as usize].codes.push(id);
        self.value_ids.push(HashMap::new());
        self.code_ids.insert(key, id);
        Ok(id)
    }

    fn intern_value(&mut self, code: u32, value: &str) -> Result<u32> {
        let ids = &mut self.value_ids[code as usize];
        if let Some(&id) = ids.get(value) {
            return Ok(id);
        }
        let values = &mut self.header.codes[code as usize].values;
        let id = to_u32(values.len())?;
        values.push(value.to_string());
        ids.insert(value.to_string(), id);
        Ok(id)
    }

    /// Writes the archive directory and moves it into place. Returns the archive path.
    pub fn finalize(self) -> Result<PathBuf> {
        let Self {
            path,
            options,
            staging,
            blocks,
            vectors,
            keys,
            header,
            data_len,
            ..
        } = self;
        let guid = new_guid();
        HeaderCodec::validate(&header, data_len)?;

        let staged = blocks.stats();
        let archive_path = staging.path().join(ARCHIVE_FILE);
        let mut out = BufWriter::new(fs_err::File::create(&archive_path)?);
        let header_len = HeaderCodec::write(&mut out, &header)?;
        let copied = blocks.drain_into(&mut out)?;
        if copied != data_len {
            return Err(ArribaError::StagingCorruption {
                offset: copied,
                reason: format!("drained {copied} of {data_len} staged bytes"),
            });
        }
        let file = out
            .into_inner()
            .map_err(|err| ArribaError::Io(err.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs_err::remove_file(staging.path().join(BLOCKS_LOG))?;

        if let Some(writer) = vectors {
            if !writer.is_empty() {
                writer.finish(&guid, &staging.path().join(VECTORS_FILE))?;
            }
            fs_err::remove_file(staging.path().join(VECTORS_SCRATCH))?;
        }
        if let Some(keys) = keys {
            keys.build(&guid).write(&staging.path().join(INDEX_FILE))?;
        }

        let summaries = header
            .taggers
            .iter()
            .map(|tagger| {
                Ok(TaggerSummary {
                    signature: tagger.signature_value()?,
                    tags: tagger
                        .codes
                        .iter()
                        .map(|&code| header.codes[code as usize].name.clone())
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let meta = ArchiveMeta::new(guid, summaries);
        fs_err::write(
            staging.path().join(META_FILE),
            serde_json::to_string_pretty(&meta)?,
        )?;

        commit(staging.path(), &path, options.overwrite)?;
        tracing::debug!(
            archive.path = %path.display(),
            archive.guid = %meta.guid,
            archive.documents = staged.records,
            archive.codes = header.codes.len(),
            archive.header_bytes = header_len,
            archive.data_bytes = data_len,
            "archive finalized"
        );
        // The staging directory now lives at `path`; dropping the handle finds nothing left
        // to remove.
        drop(staging);
        Ok(path)
    }
}

fn prepare_tags<'i>(
    input: &'i DocumentInput,
    chars: &CharOffsets,
    table: &mut SpanTable,
) -> Result<(Vec<String>, Vec<PreparedTag<'i>>)> {
    let mut signatures = Vec::with_capacity(input.taggers.len());
    let mut tags = Vec::new();
    let mut seen: HashSet<(String, &str)> = HashSet::new();
    for (position, tagger) in input.taggers.iter().enumerate() {
        let signature = serde_json::to_string(&tagger.signature)?;
        for (name, entries) in &tagger.tags {
            if !seen.insert((signature.clone(), name.as_str())) {
                return Err(ArribaError::DuplicateTag {
                    tagger: position,
                    tag: name.clone(),
                });
            }
            let mut prepared = Vec::with_capacity(entries.len());
            for (at, entry) in entries.iter().enumerate() {
                let span = match (entry.start, entry.end) {
                    (Some(start), Some(end)) => Some(insert_span(table, chars, start, end)?),
                    (None, None) => None,
                    (start, end) => {
                        return Err(ArribaError::InvalidSpan {
                            start: start.unwrap_or_default(),
                            end: end.unwrap_or_default(),
                            reason: "span needs both start and end",
                        });
                    }
                };
                if let Some(parent) = entry.parent {
                    if parent >= entries.len() {
                        return Err(ArribaError::InvalidParent {
                            tag: name.clone(),
                            entry: at,
                            parent,
                            len: entries.len(),
                        });
                    }
                }
                prepared.push(PreparedEntry {
                    span,
                    labels: &entry.labels,
                    parent: entry.parent,
                });
            }
            tags.push(PreparedTag {
                signature: signature.clone(),
                name: name.as_str(),
                entries: prepared,
                vectors: Vec::new(),
            });
        }
        for (name, vectors) in &tagger.vectors {
            let Some(tag) = tags
                .iter_mut()
                .rev()
                .find(|tag| tag.signature == signature && tag.name == name.as_str())
            else {
                return Err(ArribaError::UnknownTag { name: name.clone() });
            };
            for (stream, rows) in vectors.streams() {
                check_rows(tag, stream, rows)?;
                tag.vectors.push((stream, rows));
            }
        }
        signatures.push(signature);
    }
    Ok((signatures, tags))
}

fn insert_span(table: &mut SpanTable, chars: &CharOffsets, start: usize, end: usize) -> Result<SpanId> {
    if end < start {
        return Err(ArribaError::InvalidSpan {
            start,
            end,
            reason: "end lies before start",
        });
    }
    let beyond = || ArribaError::InvalidSpan {
        start,
        end,
        reason: "span reaches beyond the text",
    };
    let byte_start = chars.byte_offset(start).ok_or_else(beyond)?;
    let byte_end = chars.byte_offset(end).ok_or_else(beyond)?;
    table.insert_or_get(byte_start, byte_end)
}

fn check_rows(tag: &PreparedTag<'_>, stream: &str, rows: &[Vec<f32>]) -> Result<()> {
    if rows.len() != tag.entries.len() {
        return Err(ArribaError::InvalidVector {
            reason: format!(
                "tag '{}' has {} entries but stream '{stream}' has {} rows",
                tag.name,
                tag.entries.len(),
                rows.len()
            ),
        });
    }
    let dim = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|row| row.len() != dim) {
        return Err(ArribaError::InvalidVector {
            reason: format!(
                "row {bad} of stream '{stream}' on tag '{}' has {} values, expected {dim}",
                tag.name,
                rows[bad].len()
            ),
        });
    }
    Ok(())
}

/// Upper-case random UUID followed by the creation time in nanoseconds, in hex.
fn new_guid() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!(
        "{}-{nanos:X}",
        Uuid::new_v4().hyphenated().to_string().to_uppercase()
    )
}

/// Moves the finished staging directory to `target`.
fn commit(staging: &Path, target: &Path, overwrite: bool) -> Result<()> {
    if !target.exists() {
        fs_err::rename(staging, target)?;
        return Ok(());
    }
    if !overwrite {
        return Err(ArribaError::ArchiveExists {
            path: target.to_path_buf(),
        });
    }
    let mut backup = staging.as_os_str().to_owned();
    backup.push(".replaced");
    let backup = PathBuf::from(backup);
    fs_err::rename(target, &backup)?;
    if let Err(err) = fs_err::rename(staging, target) {
        if let Err(restore) = fs_err::rename(&backup, target) {
            tracing::error!(
                archive.path = %target.display(),
                backup.path = %backup.display(),
                error = %restore,
                "failed to restore replaced archive"
            );
        }
        return Err(err.into());
    }
    let removed = if backup.is_dir() {
        fs_err::remove_dir_all(&backup)
    } else {
        fs_err::remove_file(&backup)
    };
    if let Err(err) = removed {
        tracing::warn!(
            backup.path = %backup.display(),
            error = %err,
            "could not remove replaced archive"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TagInput, TaggerInput};
    use serde_json::json;

    fn tagger() -> TaggerInput {
        TaggerInput::new(json!({"lib": "x"}))
    }

    #[test]
    fn validation_failures_leave_the_writer_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer =
            ArchiveWriter::create(dir.path().join("out"), WriterOptions::default()).expect("writer");

        let backwards = DocumentInput::new("Ab.")
            .tagger(tagger().tag("token", vec![TagInput::span(2, 1).label("x")]));
        match writer.add_document(&backwards) {
            Err(ArribaError::InvalidSpan { start, end, .. }) => assert_eq!((start, end), (2, 1)),
            other => panic!("unexpected result: {other:?}"),
        }

        let orphan = DocumentInput::new("Ab.").tagger(
            tagger().tag("token", vec![TagInput::span(0, 1).label("A").parent(4)]),
        );
        match writer.add_document(&orphan) {
            Err(ArribaError::InvalidParent { parent, len, .. }) => assert_eq!((parent, len), (4, 1)),
            other => panic!("unexpected result: {other:?}"),
        }

        let twice = DocumentInput::new("Ab.").tagger(tagger().tag(
            "token",
            vec![TagInput::span(0, 1).label("A"), TagInput::span(0, 1).label("B")],
        ));
        assert!(matches!(
            writer.add_document(&twice),
            Err(ArribaError::InvalidSpan { .. })
        ));

        assert!(writer.is_empty());
        assert!(writer.header.taggers.is_empty());
        assert!(writer.header.codes.is_empty());
    }

    #[test]
    fn dictionaries_keep_first_seen_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer =
            ArchiveWriter::create(dir.path().join("out"), WriterOptions::default()).expect("writer");
        for text in ["a b", "b a"] {
            let doc = DocumentInput::new(text).tagger(tagger().tag(
                "token",
                vec![
                    TagInput::span(0, 1).label(&text[0..1]),
                    TagInput::span(2, 3).label(&text[2..3]),
                ],
            ));
            writer.add_document(&doc).expect("add");
        }
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.header.taggers.len(), 1);
        assert_eq!(writer.header.codes[0].values, vec!["a", "b"]);
    }

    #[test]
    fn guid_has_uuid_and_time_parts() {
        let guid = new_guid();
        let (uuid, nanos) = guid.rsplit_once('-').expect("separator");
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid, uuid.to_uppercase());
        assert!(u128::from_str_radix(nanos, 16).is_ok());
    }
}
