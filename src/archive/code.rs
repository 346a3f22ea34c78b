use once_cell::unsync::OnceCell;

use crate::io::block::CodeBlock;
use crate::types::{CodeMeta, Label, LabelArity, LabelValue};

const NO_ENTRY: u32 = u32::MAX;

/// One code's data inside one document, bound to the code's dictionary entry.
#[derive(Debug)]
pub(crate) struct CodeView<'a> {
    block: CodeBlock<'a>,
    meta: &'a CodeMeta,
    span_count: usize,
    /// Dense span -> entry table, built on the first per-span lookup.
    positions: OnceCell<Vec<u32>>,
}

impl<'a> CodeView<'a> {
    pub(crate) fn new(block: CodeBlock<'a>, meta: &'a CodeMeta, span_count: usize) -> Self {
        Self {
            block,
            meta,
            span_count,
            positions: OnceCell::new(),
        }
    }

    pub(crate) fn block(&self) -> &CodeBlock<'a> {
        &self.block
    }

    fn positions(&self) -> &[u32] {
        self.positions.get_or_init(|| {
            let mut positions = vec![NO_ENTRY; self.span_count];
            let refs = self.block.span_refs();
            for (at, span) in refs.iter().enumerate() {
                // Entry counts are bounded by the u32 packed width of the span refs.
                positions[span as usize] = (at + self.block.doc_entries()) as u32;
            }
            positions
        })
    }

    /// Entry labelling `span`, if any.
    pub(crate) fn entry_for_span(&self, span: usize) -> Option<usize> {
        match self.positions().get(span) {
            Some(&entry) if entry != NO_ENTRY => Some(entry as usize),
            _ => None,
        }
    }

    pub(crate) fn labels(&self, entry: usize) -> impl Iterator<Item = Label<'a>> + '_ {
        let meta: &'a CodeMeta = self.meta;
        let block = self.block;
        block.label_range(entry).map(move |at| Label {
            value: meta.values[block.value(at)].as_str(),
            score: block.score(at),
            tagger: meta.tagger as usize,
        })
    }

    pub(crate) fn label_value(&self, entry: usize, arity: LabelArity) -> LabelValue<'a> {
        arity.build(self.labels(entry))
    }

    /// Labels of every document-level entry, in input order.
    pub(crate) fn doc_labels(&self, arity: LabelArity) -> LabelValue<'a> {
        arity.build((0..self.block.doc_entries()).flat_map(|entry| self.labels(entry)))
    }

    /// Span of the parent of `entry`. Document-level parents have no span.
    pub(crate) fn parent_span(&self, entry: usize) -> Option<(usize, usize)> {
        let parent = self.block.parent(entry)?;
        self.block.span_of(parent).map(|span| (span, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::block::{BlockLayout, CodeData, LabelBlock, encode_block};
    use crate::span::SpanTable;

    #[test]
    fn resolves_spans_labels_and_parents() {
        let mut table = SpanTable::new();
        for (start, end) in [(0, 2), (0, 1), (1, 2)] {
            table.insert_or_get(start, end).expect("span");
        }
        let sorted = table.finalize();
        let data = CodeData {
            doc_entries: 1,
            span_refs: vec![1, 2],
            labels: LabelBlock::from_entries(&[
                vec![(2, None)],
                vec![(0, Some(0.5)), (1, None)],
                vec![(1, None)],
            ]),
            parents: Some(vec![0, 0, 2]),
        };
        let bytes = encode_block("ab", b"", &sorted, &[(0, data)]).expect("encode");
        let layout = BlockLayout::parse(&bytes, 0, 1).expect("layout");
        let meta = CodeMeta {
            tagger: 3,
            name: "pos".to_string(),
            values: vec!["A".to_string(), "B".to_string(), "DOC".to_string()],
        };
        let raw = layout.find_code(0).expect("code data");
        let block = CodeBlock::parse(raw, 0, layout.spans().len(), meta.values.len())
            .expect("code block");
        let view = CodeView::new(block, &meta, layout.spans().len());

        assert_eq!(view.entry_for_span(0), None);
        assert_eq!(view.entry_for_span(1), Some(1));
        assert_eq!(view.entry_for_span(2), Some(2));
        assert_eq!(view.label_value(1, LabelArity::Str).as_str(), Some("A|B"));
        let labels: Vec<Label<'_>> = view.labels(1).collect();
        assert_eq!(labels[0].score, Some(0.5));
        assert_eq!(labels[0].tagger, 3);
        assert_eq!(view.doc_labels(LabelArity::Strs).as_strs(), Some(&["DOC"][..]));
        assert_eq!(view.parent_span(2), Some((1, 1)));
        assert_eq!(view.parent_span(1), None);
    }
}
