//! Public types exposed by the `arriba-core` crate.

pub mod input;
pub mod label;
pub mod meta;
pub mod options;

pub use input::{DocumentInput, LabelInput, TagInput, TaggerInput, VectorInput};
pub use label::{Label, LabelArity, LabelValue};
pub use meta::{ArchiveHeader, ArchiveMeta, CodeMeta, DocumentRef, TaggerMeta, TaggerSummary};
pub use options::{IterOptions, OpenReadOptions, Slice, WriterOptions, WriterOptionsBuilder};

/// Stream name used for vectors given as a plain list of rows.
pub const DEFAULT_VECTOR_STREAM: &str = "vector";
