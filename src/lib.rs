#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Strategic lint exceptions - these are allowed project-wide for pragmatic reasons:
//
// Documentation lints: Many internal/self-documenting functions don't need extensive docs.
// Public APIs should still have proper documentation.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Cast safety: offsets and counts are bounded by the packed widths checked at write time
// and by the block validation done at read time.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style/complexity: the writer's per-document pass reads best as one function.
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
// e.g., span_refs, span_ref, spans are intentionally similar
//
// Pattern matching: These pedantic lints often suggest changes that reduce clarity.
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
//
// Performance/ergonomics trade-offs that are acceptable for this codebase:
#![allow(clippy::needless_pass_by_value)] // Many builders take owned values intentionally
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't need must_use on every method
#![allow(clippy::must_use_candidate)]
//
// Low-value pedantic lints that add noise:
#![allow(clippy::struct_excessive_bools)] // Option structs naturally have many flags
#![allow(clippy::needless_range_loop)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::should_implement_trait)] // Some method names are clearer than trait names
//
// Return value wrapping: Many functions use Result for consistency even when they
// currently can't fail, allowing future error conditions to be added without breaking API.
#![allow(clippy::unnecessary_wraps)]

//! Memory-mapped columnar archive for annotated text documents.
//!
//! An archive is a directory holding `meta.json`, `archive.bin` (a header followed by one
//! block per document) and optional `vectors.bin` / `index.bin` sidecars. Documents are
//! written once through [`ArchiveWriter`] and read lazily through [`Archive`]:
//!
//! ```no_run
//! use arriba_core::{Archive, ArchiveWriter, Selection, WriterOptions};
//! use arriba_core::types::{DocumentInput, TagInput, TaggerInput};
//! use serde_json::json;
//!
//! # fn main() -> arriba_core::Result<()> {
//! let mut writer = ArchiveWriter::create("corpus", WriterOptions::default())?;
//! writer.add_document(&DocumentInput::new("Ab.").tagger(
//!     TaggerInput::new(json!({"lib": "x"}))
//!         .tag("token", vec![TagInput::span(0, 1).label("Ab"), TagInput::span(2, 3).label(".")]),
//! ))?;
//! writer.finalize()?;
//!
//! let archive = Archive::open("corpus")?;
//! for document in archive.iter(&Selection::Auto)? {
//!     let document = document?;
//!     for token in document.spans("token")? {
//!         println!("{} {:?}", token.text(), token.label().as_str());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// The arriba-core crate version (matches `Cargo.toml`).
pub const ARRIBA_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod archive;
pub mod constants;
pub mod error;
pub mod io;
pub mod selection;
pub mod span;
pub mod text;
pub mod types;

pub use archive::{
    Archive, ArchiveWriter, Document, DocumentIter, Span, SpanIter, SpanList, TagValue,
};
pub use constants::*;
pub use error::{ArribaError, Result};
pub use selection::{Selection, TagRegistry, TagSpec, TaggerQuery, TaggerTarget};
pub use types::{
    DocumentInput, IterOptions, Label, LabelArity, LabelValue, OpenReadOptions, Slice,
    TagInput, TaggerInput, WriterOptions,
};
