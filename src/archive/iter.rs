use std::rc::Rc;

use crate::archive::Archive;
use crate::archive::document::Document;
use crate::error::Result;
use crate::selection::TagRegistry;
use crate::types::IterOptions;

/// Pull-based pass over an archive's documents.
///
/// The selection is resolved once when the iterator is created. Nothing is decoded until
/// a document is pulled, and a corrupt block surfaces as an `Err` item naming its index so
/// the caller can skip it and continue.
#[derive(Debug)]
pub struct DocumentIter<'a> {
    archive: &'a Archive,
    registry: Rc<TagRegistry>,
    next: usize,
    step: usize,
}

impl<'a> DocumentIter<'a> {
    pub(crate) fn new(archive: &'a Archive, registry: Rc<TagRegistry>, options: IterOptions) -> Self {
        let (next, step) = options
            .slice
            .map_or((0, 1), |slice| (slice.index() - 1, slice.count()));
        Self {
            archive,
            registry,
            next,
            step,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<TagRegistry> {
        &self.registry
    }

    fn remaining(&self) -> usize {
        self.archive
            .len()
            .saturating_sub(self.next)
            .div_ceil(self.step)
    }
}

impl<'a> Iterator for DocumentIter<'a> {
    type Item = Result<Document<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.archive.len() {
            return None;
        }
        let index = self.next;
        self.next += self.step;
        Some(self.archive.document(index, &self.registry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DocumentIter<'_> {}
