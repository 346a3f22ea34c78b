//! Lazy views over one document block.
//!
//! A [`Document`] holds the block's parsed frame and nothing else. Each selected tag is
//! decoded the first time it is asked for and memoized on that document instance; spans
//! and labels borrow straight from the archive mapping.

use std::ops::Range;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde_json::Value;

use crate::archive::Archive;
use crate::archive::code::CodeView;
use crate::error::{ArribaError, Result};
use crate::io::block::{BlockLayout, CodeBlock};
use crate::selection::{TagForm, TagRegistry};
use crate::text::CharOffsets;
use crate::types::LabelValue;

#[derive(Debug)]
pub struct Document<'a> {
    archive: &'a Archive,
    index: usize,
    layout: BlockLayout<'a>,
    registry: Rc<TagRegistry>,
    codes: Vec<OnceCell<Option<CodeView<'a>>>>,
    chars: OnceCell<CharOffsets>,
}

impl<'a> Document<'a> {
    pub(crate) fn new(
        archive: &'a Archive,
        index: usize,
        layout: BlockLayout<'a>,
        registry: Rc<TagRegistry>,
    ) -> Self {
        let codes = (0..registry.len()).map(|_| OnceCell::new()).collect();
        Self {
            archive,
            index,
            layout,
            registry,
            codes,
            chars: OnceCell::new(),
        }
    }

    /// Position of the document in its archive.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn text(&self) -> &'a str {
        self.layout.text()
    }

    /// Producer metadata, `Value::Null` when none was written.
    pub fn meta(&self) -> Result<Value> {
        let bytes = self.layout.meta();
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes)
            .map_err(|err| ArribaError::decoding(self.index, format!("meta is not JSON: {err}")))
    }

    /// Number of distinct spans stored for the document, across all tags.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.layout.spans().len()
    }

    #[must_use]
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Selected tag names that carry data in this document, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .registry
            .forms()
            .iter()
            .filter(|form| self.layout.find_code(form.code).is_some())
            .map(|form| form.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Looks up a selected tag by singular or plural name.
    ///
    /// The singular name yields the document-level labels of the tag (the arity's empty
    /// sentinel when there are none); the plural yields every span of the tag.
    pub fn get(&self, name: &str) -> Result<TagValue<'_, 'a>> {
        let found = self.registry.lookup(name)?;
        let code = self.code(found.index)?;
        if found.plural {
            return Ok(TagValue::Spans(SpanList::all(self, found.index, code)));
        }
        let arity = self.registry.form(found.index).arity;
        Ok(TagValue::Value(
            code.map_or_else(|| arity.empty(), |code| code.doc_labels(arity)),
        ))
    }

    /// Every span of a selected tag, by singular or plural name.
    pub fn spans(&self, name: &str) -> Result<SpanList<'_, 'a>> {
        let found = self.registry.lookup(name)?;
        let code = self.code(found.index)?;
        Ok(SpanList::all(self, found.index, code))
    }

    fn form(&self, index: usize) -> &TagForm {
        self.registry.form(index)
    }

    /// Decoded data of form `index`, `None` when the document has no entries for it.
    fn code(&self, index: usize) -> Result<Option<&CodeView<'a>>> {
        self.codes[index]
            .get_or_try_init(|| {
                let code = self.form(index).code;
                let Some(raw) = self.layout.find_code(code) else {
                    return Ok(None);
                };
                let archive: &'a Archive = self.archive;
                let meta = archive.header.codes.get(code as usize).ok_or_else(|| {
                    ArribaError::decoding(self.index, format!("code {code} missing from header"))
                })?;
                let span_count = self.span_count();
                let block = CodeBlock::parse(raw, self.index, span_count, meta.values.len())?;
                tracing::trace!(
                    document.index = self.index,
                    document.code = code,
                    document.entries = block.entries(),
                    "decoded tag data"
                );
                Ok(Some(CodeView::new(block, meta, span_count)))
            })
            .map(Option::as_ref)
    }

    fn chars(&self) -> &CharOffsets {
        self.chars
            .get_or_init(|| CharOffsets::new(self.layout.text()))
    }

    fn char_index(&self, byte: usize) -> usize {
        // Span boundaries were checked against character boundaries when the block was parsed.
        self.chars().char_index(byte).unwrap_or_default()
    }
}

/// Result of a tag lookup.
#[derive(Debug, Clone)]
pub enum TagValue<'d, 'a> {
    /// Labels through the tag's arity.
    Value(LabelValue<'a>),
    /// Spans of the tag (plural access).
    Spans(SpanList<'d, 'a>),
}

impl<'d, 'a> TagValue<'d, 'a> {
    #[must_use]
    pub fn as_value(&self) -> Option<&LabelValue<'a>> {
        match self {
            Self::Value(value) => Some(value),
            Self::Spans(_) => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<LabelValue<'a>> {
        match self {
            Self::Value(value) => Some(value),
            Self::Spans(_) => None,
        }
    }

    #[must_use]
    pub fn as_spans(&self) -> Option<SpanList<'d, 'a>> {
        match self {
            Self::Value(_) => None,
            Self::Spans(spans) => Some(*spans),
        }
    }

    /// Shorthand for a `str` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(LabelValue::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Value(value) => value.is_empty(),
            Self::Spans(spans) => spans.is_empty(),
        }
    }
}

/// Spans of one tag, either all of them or those inside a window.
#[derive(Debug, Clone, Copy)]
pub struct SpanList<'d, 'a> {
    doc: &'d Document<'a>,
    form: usize,
    code: Option<&'d CodeView<'a>>,
    /// First position in the code's span refs.
    first: usize,
    /// Inclusive byte bound: only spans ending at or before it are yielded, and the scan
    /// stops at the first span starting after it.
    limit: Option<usize>,
}

impl<'d, 'a> SpanList<'d, 'a> {
    fn all(doc: &'d Document<'a>, form: usize, code: Option<&'d CodeView<'a>>) -> Self {
        Self {
            doc,
            form,
            code,
            first: 0,
            limit: None,
        }
    }

    /// Spans of the code contained in the byte window `[start, end)`.
    fn within(
        doc: &'d Document<'a>,
        form: usize,
        code: Option<&'d CodeView<'a>>,
        window: Range<usize>,
    ) -> Self {
        let first = code.map_or(0, |code| {
            let span = doc.layout.spans().find_first_start_at_or_after(window.start);
            code.block().span_refs().lower_bound(span as u64)
        });
        Self {
            doc,
            form,
            code,
            first,
            limit: Some(window.end),
        }
    }

    /// Name of the tag the spans belong to.
    #[must_use]
    pub fn tag(&self) -> &'d str {
        self.doc.form(self.form).name.as_str()
    }

    #[must_use]
    pub fn iter(&self) -> SpanIter<'d, 'a> {
        SpanIter {
            list: *self,
            next: self.first,
        }
    }

    /// Number of spans. Windowed lists count by scanning.
    #[must_use]
    pub fn len(&self) -> usize {
        match (self.code, self.limit) {
            (None, _) => 0,
            (Some(code), None) => code.block().span_refs().len(),
            (Some(_), Some(_)) => self.iter().count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Span<'d, 'a>> {
        self.iter().nth(index)
    }

    #[must_use]
    pub fn first(&self) -> Option<Span<'d, 'a>> {
        self.iter().next()
    }
}

impl<'d, 'a> IntoIterator for SpanList<'d, 'a> {
    type Item = Span<'d, 'a>;
    type IntoIter = SpanIter<'d, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'d, 'a> IntoIterator for &SpanList<'d, 'a> {
    type Item = Span<'d, 'a>;
    type IntoIter = SpanIter<'d, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct SpanIter<'d, 'a> {
    list: SpanList<'d, 'a>,
    next: usize,
}

impl<'d, 'a> Iterator for SpanIter<'d, 'a> {
    type Item = Span<'d, 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let code = self.list.code?;
        let block = code.block();
        let refs = block.span_refs();
        while self.next < refs.len() {
            let at = self.next;
            self.next += 1;
            let span = refs.value(at) as usize;
            let (start, end) = self.list.doc.layout.spans().lookup(span);
            if let Some(limit) = self.list.limit {
                if start > limit {
                    self.next = refs.len();
                    return None;
                }
                if end > limit {
                    continue;
                }
            }
            return Some(Span {
                doc: self.list.doc,
                form: self.list.form,
                code,
                span,
                entry: at + block.doc_entries(),
            });
        }
        None
    }
}

/// One span of one tag.
#[derive(Debug, Clone, Copy)]
pub struct Span<'d, 'a> {
    doc: &'d Document<'a>,
    form: usize,
    code: &'d CodeView<'a>,
    span: usize,
    entry: usize,
}

impl<'d, 'a> Span<'d, 'a> {
    /// Index of the span in the document's span table. Tags covering the same range share
    /// it.
    #[must_use]
    pub fn id(&self) -> usize {
        self.span
    }

    #[must_use]
    pub fn tag(&self) -> &'d str {
        self.doc.form(self.form).name.as_str()
    }

    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        let (start, end) = self.doc.layout.spans().lookup(self.span);
        start..end
    }

    /// Start as a character offset.
    #[must_use]
    pub fn start(&self) -> usize {
        self.doc.char_index(self.byte_range().start)
    }

    /// End (exclusive) as a character offset.
    #[must_use]
    pub fn end(&self) -> usize {
        self.doc.char_index(self.byte_range().end)
    }

    #[must_use]
    pub fn text(&self) -> &'a str {
        let text: &'a str = self.doc.layout.text();
        &text[self.byte_range()]
    }

    #[must_use]
    pub fn label(&self) -> LabelValue<'a> {
        self.code
            .label_value(self.entry, self.doc.form(self.form).arity)
    }

    /// Another selected tag seen from this span.
    ///
    /// A singular name gives that tag's labels on exactly this span (or the empty
    /// sentinel); a plural name gives that tag's spans contained in this one.
    pub fn get(&self, name: &str) -> Result<TagValue<'d, 'a>> {
        let doc = self.doc;
        let found = doc.registry.lookup(name)?;
        let code = doc.code(found.index)?;
        if found.plural {
            return Ok(TagValue::Spans(SpanList::within(
                doc,
                found.index,
                code,
                self.byte_range(),
            )));
        }
        let arity = doc.form(found.index).arity;
        let value = code
            .and_then(|code| {
                code.entry_for_span(self.span)
                    .map(|entry| code.label_value(entry, arity))
            })
            .unwrap_or_else(|| arity.empty());
        Ok(TagValue::Value(value))
    }

    /// Parent span within the same tag, when the tag stores a hierarchy.
    #[must_use]
    pub fn parent(&self) -> Option<Span<'d, 'a>> {
        let (span, entry) = self.code.parent_span(self.entry)?;
        Some(Span {
            span,
            entry,
            ..*self
        })
    }

    /// Row of this span in the vector stream `stream`, if one was stored.
    #[must_use]
    pub fn vector(&self, stream: &str) -> Option<Vec<f32>> {
        let archive: &'a Archive = self.doc.archive;
        archive.vectors.as_ref()?.row(
            self.doc.index as u64,
            self.doc.form(self.form).code,
            stream,
            self.entry,
        )
    }
}
