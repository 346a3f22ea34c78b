//! Core `Archive` type: opening, iterating and writing archive directories.

mod code;
pub mod document;
pub mod iter;
pub mod lifecycle;
pub mod writer;

pub use document::{Document, Span, SpanIter, SpanList, TagValue};
pub use iter::DocumentIter;
pub use lifecycle::Archive;
pub use writer::ArchiveWriter;
