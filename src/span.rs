//! Per-document span tables.
//!
//! Spans are half-open byte ranges kept in canonical order: ascending start, and for equal
//! starts the longer (outer) span first. [`SpanTable`] collects spans while a document is
//! built and hands out provisional ids; [`SpanTable::finalize`] sorts them and returns the
//! mapping from provisional id to final index. [`SpanIndex`] is the read-side view over the
//! packed `starts`/`lens` columns of a document block.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::{ArribaError, Result};
use crate::io::packed::PackedInts;

/// Provisional span id, valid until [`SpanTable::finalize`].
pub type SpanId = u32;

#[derive(Debug, Default)]
pub struct SpanTable {
    spans: Vec<(usize, usize)>,
    ids: HashMap<(usize, usize), SpanId>,
}

impl SpanTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Registers `[start, end)`, returning the existing id for a span seen before.
    pub fn insert_or_get(&mut self, start: usize, end: usize) -> Result<SpanId> {
        if end < start {
            return Err(ArribaError::InvalidSpan {
                start,
                end,
                reason: "end lies before start",
            });
        }
        if let Some(&id) = self.ids.get(&(start, end)) {
            return Ok(id);
        }
        let id = SpanId::try_from(self.spans.len()).map_err(|_| ArribaError::EncodingRange {
            value: self.spans.len() as u64,
            max_bits: 32,
        })?;
        self.spans.push((start, end));
        self.ids.insert((start, end), id);
        Ok(id)
    }

    /// Sorts the spans into canonical order.
    #[must_use]
    pub fn finalize(self) -> SortedSpans {
        let mut order: Vec<SpanId> = (0..self.spans.len() as SpanId).collect();
        order.sort_by_key(|&id| {
            let (start, end) = self.spans[id as usize];
            (start, Reverse(end - start))
        });

        let mut remap = vec![0u32; order.len()];
        let mut starts = Vec::with_capacity(order.len());
        let mut ends = Vec::with_capacity(order.len());
        for (index, &id) in order.iter().enumerate() {
            let (start, end) = self.spans[id as usize];
            remap[id as usize] = index as u32;
            starts.push(start);
            ends.push(end);
        }
        SortedSpans {
            starts,
            ends,
            remap,
        }
    }
}

/// Spans in canonical order plus the provisional-id mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedSpans {
    starts: Vec<usize>,
    ends: Vec<usize>,
    remap: Vec<u32>,
}

impl SortedSpans {
    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Final index of a provisional id.
    #[must_use]
    pub fn remap(&self, id: SpanId) -> usize {
        self.remap[id as usize] as usize
    }

    #[must_use]
    pub fn lookup(&self, index: usize) -> (usize, usize) {
        (self.starts[index], self.ends[index])
    }

    /// First index whose start is `>= offset`.
    #[must_use]
    pub fn find_first_start_at_or_after(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start < offset)
    }

    #[must_use]
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Span lengths, the column stored next to `starts`.
    pub fn lens(&self) -> impl Iterator<Item = usize> + '_ {
        self.starts
            .iter()
            .zip(&self.ends)
            .map(|(start, end)| end - start)
    }
}

/// Read-side span columns of one document block.
#[derive(Debug, Clone, Copy)]
pub struct SpanIndex<'a> {
    starts: PackedInts<'a>,
    lens: PackedInts<'a>,
}

impl<'a> SpanIndex<'a> {
    pub(crate) fn new(starts: PackedInts<'a>, lens: PackedInts<'a>) -> Self {
        Self { starts, lens }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Byte range of span `index`. Bounds and overflow were checked when the block was
    /// parsed.
    #[must_use]
    pub fn lookup(&self, index: usize) -> (usize, usize) {
        let start = self.starts.value(index) as usize;
        (start, start + self.lens.value(index) as usize)
    }

    #[must_use]
    pub fn find_first_start_at_or_after(&self, offset: usize) -> usize {
        self.starts.lower_bound(offset as u64)
    }

    /// Checks column lengths, text bounds, UTF-8 boundaries and canonical order.
    pub(crate) fn validate(&self, text: &str) -> std::result::Result<(), String> {
        if self.starts.len() != self.lens.len() {
            return Err(format!(
                "span columns disagree: {} starts, {} lens",
                self.starts.len(),
                self.lens.len()
            ));
        }
        let mut previous: Option<(u64, u64)> = None;
        for index in 0..self.starts.len() {
            let start = self.starts.value(index);
            let len = self.lens.value(index);
            let end = start
                .checked_add(len)
                .filter(|&end| end <= text.len() as u64)
                .ok_or_else(|| format!("span {index} ends beyond text of {} bytes", text.len()))?;
            if !text.is_char_boundary(start as usize) || !text.is_char_boundary(end as usize) {
                return Err(format!("span {index} splits a UTF-8 character"));
            }
            if let Some((prev_start, prev_len)) = previous {
                if start < prev_start || (start == prev_start && len > prev_len) {
                    return Err(format!("span {index} is out of canonical order"));
                }
            }
            previous = Some((start, len));
        }
        Ok(())
    }
}
