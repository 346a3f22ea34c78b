//! Document block layout.
//!
//! ```text
//! u32 text_len | text          UTF-8
//! u32 meta_len | meta          compact JSON, empty when absent
//! packed starts                byte offsets, 64-bit allowed
//! packed lens
//! u32 tag_count
//! tag_count x (u32 code, u32 offset, u32 len)   ascending by code
//! tag region                   code data addressed by the directory
//! ```
//!
//! Code data holds `u32 doc_entries`, `packed span_refs`, `u8 label_shape`, optional
//! `packed groups`, `packed values`, `u8 has_scores` + `f32` scores (NaN when a label has no
//! score) and `u8 has_parents` + `packed parents` (`0` = none, `k + 1` = entry `k`).
//! Document-level entries come first, then one entry per span in ascending span order.

use std::ops::Range;

use crate::error::{ArribaError, Result};
use crate::io::cursor::{ByteReader, ByteSink, u32_at};
use crate::io::packed::{self, PackedInts};
use crate::span::{SortedSpans, SpanIndex};

const DIRECTORY_ENTRY: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LabelShape {
    Empty = 0,
    Single = 1,
    Grouped = 2,
}

impl LabelShape {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Empty),
            1 => Some(Self::Single),
            2 => Some(Self::Grouped),
            _ => None,
        }
    }
}

/// Labels of one code in one document, in entry order.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelBlock {
    Empty,
    Single {
        values: Vec<u64>,
        scores: Option<Vec<f32>>,
    },
    Grouped {
        groups: Vec<u64>,
        values: Vec<u64>,
        scores: Option<Vec<f32>>,
    },
}

impl LabelBlock {
    /// Picks the narrowest shape for per-entry `(value, score)` lists.
    #[must_use]
    pub fn from_entries(entries: &[Vec<(u32, Option<f32>)>]) -> Self {
        if entries.iter().all(Vec::is_empty) {
            return Self::Empty;
        }
        let flat: Vec<&(u32, Option<f32>)> = entries.iter().flatten().collect();
        let values = flat.iter().map(|(value, _)| u64::from(*value)).collect();
        let scores = flat
            .iter()
            .any(|(_, score)| score.is_some())
            .then(|| {
                flat.iter()
                    .map(|(_, score)| score.unwrap_or(f32::NAN))
                    .collect()
            });
        if entries.iter().all(|labels| labels.len() == 1) {
            return Self::Single { values, scores };
        }
        let mut groups = Vec::with_capacity(entries.len() + 1);
        let mut offset = 0u64;
        groups.push(offset);
        for labels in entries {
            offset += labels.len() as u64;
            groups.push(offset);
        }
        Self::Grouped {
            groups,
            values,
            scores,
        }
    }

    #[must_use]
    pub fn shape(&self) -> LabelShape {
        match self {
            Self::Empty => LabelShape::Empty,
            Self::Single { .. } => LabelShape::Single,
            Self::Grouped { .. } => LabelShape::Grouped,
        }
    }
}

/// Write-side code data.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeData {
    pub doc_entries: u32,
    pub span_refs: Vec<u64>,
    pub labels: LabelBlock,
    pub parents: Option<Vec<u64>>,
}

impl CodeData {
    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.put_u32(self.doc_entries);
        packed::encode(&self.span_refs, false)?.write_to(out)?;
        out.put_u8(self.labels.shape() as u8);
        let (values, scores): (&[u64], Option<&Vec<f32>>) = match &self.labels {
            LabelBlock::Empty => (&[][..], None),
            LabelBlock::Single { values, scores } => (values.as_slice(), scores.as_ref()),
            LabelBlock::Grouped {
                groups,
                values,
                scores,
            } => {
                packed::encode(groups, false)?.write_to(out)?;
                (values.as_slice(), scores.as_ref())
            }
        };
        packed::encode(values, false)?.write_to(out)?;
        match scores {
            Some(scores) => {
                out.put_u8(1);
                for score in scores {
                    out.extend_from_slice(&score.to_le_bytes());
                }
            }
            None => out.put_u8(0),
        }
        match &self.parents {
            Some(parents) => {
                out.put_u8(1);
                packed::encode(parents, false)?.write_to(out)?;
            }
            None => out.put_u8(0),
        }
        Ok(())
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArribaError::EncodingRange {
        value: value as u64,
        max_bits: 32,
    })
}

/// Serializes one document block. `tags` must be sorted by code.
pub fn encode_block(
    text: &str,
    meta: &[u8],
    spans: &SortedSpans,
    tags: &[(u32, CodeData)],
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() + meta.len() + 64);
    out.put_prefixed(text.as_bytes())?;
    out.put_prefixed(meta)?;

    let starts: Vec<u64> = spans.starts().iter().map(|&start| start as u64).collect();
    let lens: Vec<u64> = spans.lens().map(|len| len as u64).collect();
    packed::encode(&starts, true)?.write_to(&mut out)?;
    packed::encode(&lens, true)?.write_to(&mut out)?;

    let mut region = Vec::new();
    let mut directory = Vec::with_capacity(tags.len() * DIRECTORY_ENTRY);
    for (code, data) in tags {
        let offset = to_u32(region.len())?;
        data.write_to(&mut region)?;
        directory.put_u32(*code);
        directory.put_u32(offset);
        directory.put_u32(to_u32(region.len())? - offset);
    }
    out.put_u32(to_u32(tags.len())?);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&region);
    Ok(out)
}

/// Parsed, validated frame of a document block. Code data is located but not decoded.
#[derive(Debug, Clone, Copy)]
pub struct BlockLayout<'a> {
    document: usize,
    text: &'a str,
    meta: &'a [u8],
    spans: SpanIndex<'a>,
    directory: &'a [u8],
    region: &'a [u8],
}

impl<'a> BlockLayout<'a> {
    /// `code_count` is the size of the archive's code dictionary.
    pub fn parse(bytes: &'a [u8], document: usize, code_count: usize) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, document);
        let text = reader.read_prefixed("text")?;
        let text = std::str::from_utf8(text)
            .map_err(|err| reader.error(format!("text is not UTF-8: {err}")))?;
        let meta = reader.read_prefixed("meta")?;
        let starts = PackedInts::read(&mut reader, "span starts")?;
        let lens = PackedInts::read(&mut reader, "span lengths")?;
        let spans = SpanIndex::new(starts, lens);
        spans.validate(text).map_err(|reason| reader.error(reason))?;

        let tag_count = reader.read_u32("tag count")? as usize;
        let directory_len = tag_count
            .checked_mul(DIRECTORY_ENTRY)
            .ok_or_else(|| reader.error("tag count overflows"))?;
        let directory = reader.take(directory_len, "tag directory")?;
        let region = reader.take(reader.remaining(), "tag region")?;

        let layout = Self {
            document,
            text,
            meta,
            spans,
            directory,
            region,
        };
        let mut previous: Option<u32> = None;
        for position in 0..tag_count {
            let (code, range) = layout.entry(position);
            if previous.is_some_and(|prev| prev >= code) {
                return Err(reader.error(format!("tag directory not ascending at code {code}")));
            }
            if code as usize >= code_count {
                return Err(reader.error(format!(
                    "tag references code {code} of {code_count}"
                )));
            }
            if range.end > region.len() || range.start > range.end {
                return Err(reader.error(format!("code {code} data outside tag region")));
            }
            previous = Some(code);
        }
        Ok(layout)
    }

    fn entry(&self, position: usize) -> (u32, Range<usize>) {
        let base = position * 3;
        let code = u32_at(self.directory, base);
        let offset = u32_at(self.directory, base + 1) as usize;
        let len = u32_at(self.directory, base + 2) as usize;
        (code, offset..offset.saturating_add(len))
    }

    #[must_use]
    pub fn document(&self) -> usize {
        self.document
    }

    #[must_use]
    pub fn text(&self) -> &'a str {
        self.text
    }

    #[must_use]
    pub fn meta(&self) -> &'a [u8] {
        self.meta
    }

    #[must_use]
    pub fn spans(&self) -> SpanIndex<'a> {
        self.spans
    }

    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.directory.len() / DIRECTORY_ENTRY
    }

    /// Code ids present in this document, ascending.
    pub fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.tag_count()).map(|position| self.entry(position).0)
    }

    /// Raw code data for `code`, found by binary search over the directory.
    #[must_use]
    pub fn find_code(&self, code: u32) -> Option<&'a [u8]> {
        let (mut lo, mut hi) = (0, self.tag_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (found, range) = self.entry(mid);
            match found.cmp(&code) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(&self.region[range]),
            }
        }
        None
    }
}

/// Decoded view over one code's data.
#[derive(Debug, Clone, Copy)]
pub struct CodeBlock<'a> {
    doc_entries: usize,
    span_refs: PackedInts<'a>,
    shape: LabelShape,
    groups: PackedInts<'a>,
    values: PackedInts<'a>,
    scores: Option<&'a [u8]>,
    parents: Option<PackedInts<'a>>,
}

impl<'a> CodeBlock<'a> {
    /// Decodes and validates code data against the document's span count and the code's
    /// value dictionary size.
    pub fn parse(
        bytes: &'a [u8],
        document: usize,
        span_count: usize,
        value_count: usize,
    ) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, document);
        let doc_entries = reader.read_u32("document entries")? as usize;
        let span_refs = PackedInts::read(&mut reader, "span refs")?;
        if !span_refs.is_strictly_ascending() {
            return Err(reader.error("span refs not strictly ascending"));
        }
        if span_refs.max().is_some_and(|max| max >= span_count as u64) {
            return Err(reader.error(format!("span ref beyond {span_count} spans")));
        }
        let entries = doc_entries + span_refs.len();

        let tag = reader.read_u8("label shape")?;
        let shape = LabelShape::from_tag(tag)
            .ok_or_else(|| reader.error(format!("unknown label shape {tag}")))?;
        let groups = if shape == LabelShape::Grouped {
            let groups = PackedInts::read(&mut reader, "label groups")?;
            if groups.len() != entries + 1 || groups.get(0) != Some(0) {
                return Err(reader.error("label groups do not cover the entries"));
            }
            if (1..groups.len()).any(|i| groups.value(i - 1) > groups.value(i)) {
                return Err(reader.error("label groups not monotonic"));
            }
            groups
        } else {
            PackedInts::empty()
        };
        let values = PackedInts::read(&mut reader, "label values")?;
        let expected = match shape {
            LabelShape::Empty => 0,
            LabelShape::Single => entries,
            LabelShape::Grouped => groups.value(entries) as usize,
        };
        if values.len() != expected {
            return Err(reader.error(format!(
                "expected {expected} label values, found {}",
                values.len()
            )));
        }
        if values.max().is_some_and(|max| max >= value_count as u64) {
            return Err(reader.error(format!("label value beyond dictionary of {value_count}")));
        }

        let scores = match reader.read_u8("score flag")? {
            0 => None,
            1 => Some(reader.take(values.len() * 4, "label scores")?),
            flag => return Err(reader.error(format!("bad score flag {flag}"))),
        };
        let parents = match reader.read_u8("parent flag")? {
            0 => None,
            1 => {
                let parents = PackedInts::read(&mut reader, "parents")?;
                if parents.len() != entries {
                    return Err(reader.error("parent count differs from entry count"));
                }
                if parents.max().is_some_and(|max| max > entries as u64) {
                    return Err(reader.error("parent beyond entry list"));
                }
                Some(parents)
            }
            flag => return Err(reader.error(format!("bad parent flag {flag}"))),
        };
        if reader.remaining() != 0 {
            return Err(reader.error(format!(
                "{} trailing bytes after code data",
                reader.remaining()
            )));
        }

        Ok(Self {
            doc_entries,
            span_refs,
            shape,
            groups,
            values,
            scores,
            parents,
        })
    }

    /// Number of leading document-level entries.
    #[must_use]
    pub fn doc_entries(&self) -> usize {
        self.doc_entries
    }

    #[must_use]
    pub fn entries(&self) -> usize {
        self.doc_entries + self.span_refs.len()
    }

    #[must_use]
    pub fn span_refs(&self) -> PackedInts<'a> {
        self.span_refs
    }

    #[must_use]
    pub fn shape(&self) -> LabelShape {
        self.shape
    }

    /// Span index of entry `entry`, `None` for document-level entries.
    #[must_use]
    pub fn span_of(&self, entry: usize) -> Option<usize> {
        entry
            .checked_sub(self.doc_entries)
            .and_then(|at| self.span_refs.get(at))
            .map(|span| span as usize)
    }

    /// Entry tagging span `span`, by binary search.
    #[must_use]
    pub fn search_span(&self, span: usize) -> Option<usize> {
        self.span_refs
            .binary_search(span as u64)
            .map(|at| at + self.doc_entries)
    }

    /// Positions in the flat value array holding entry `entry`'s labels.
    #[must_use]
    pub fn label_range(&self, entry: usize) -> Range<usize> {
        match self.shape {
            LabelShape::Empty => 0..0,
            LabelShape::Single => entry..entry + 1,
            LabelShape::Grouped => {
                self.groups.value(entry) as usize..self.groups.value(entry + 1) as usize
            }
        }
    }

    #[must_use]
    pub fn value(&self, index: usize) -> usize {
        self.values.value(index) as usize
    }

    #[must_use]
    pub fn score(&self, index: usize) -> Option<f32> {
        let bytes = self.scores?;
        let at = index * 4;
        let score = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        (!score.is_nan()).then_some(score)
    }

    #[must_use]
    pub fn has_parents(&self) -> bool {
        self.parents.is_some()
    }

    /// Parent entry of `entry`.
    #[must_use]
    pub fn parent(&self, entry: usize) -> Option<usize> {
        let parents = self.parents?;
        match parents.value(entry) {
            0 => None,
            slot => Some(slot as usize - 1),
        }
    }
}
