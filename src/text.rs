//! Character/byte offset translation for UTF-8 text.
//!
//! Producers count characters; document blocks store byte offsets so that span text can be
//! sliced without rescanning. [`CharOffsets`] walks the text once and answers both
//! directions. Pure ASCII text skips the table entirely.

#[derive(Debug, Clone)]
pub struct CharOffsets {
    byte_len: usize,
    /// Byte offset of every character plus a final entry for the end of the text. Empty
    /// for ASCII text, where both offset spaces coincide.
    boundaries: Vec<usize>,
}

impl CharOffsets {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let boundaries = if text.is_ascii() {
            Vec::new()
        } else {
            text.char_indices()
                .map(|(at, _)| at)
                .chain(std::iter::once(text.len()))
                .collect()
        };
        Self {
            byte_len: text.len(),
            boundaries,
        }
    }

    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.boundaries.is_empty()
    }

    #[must_use]
    pub fn char_count(&self) -> usize {
        if self.is_ascii() {
            self.byte_len
        } else {
            self.boundaries.len() - 1
        }
    }

    /// Byte offset of character `index`; `index == char_count()` maps to the text end.
    #[must_use]
    pub fn byte_offset(&self, index: usize) -> Option<usize> {
        if self.is_ascii() {
            (index <= self.byte_len).then_some(index)
        } else {
            self.boundaries.get(index).copied()
        }
    }

    /// Character index of a byte offset, or `None` when the offset does not fall on a
    /// character boundary.
    #[must_use]
    pub fn char_index(&self, byte: usize) -> Option<usize> {
        if self.is_ascii() {
            (byte <= self.byte_len).then_some(byte)
        } else {
            self.boundaries.binary_search(&byte).ok()
        }
    }
}
