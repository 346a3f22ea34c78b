//! Byte-level codecs: packed integers, document blocks, the archive header and the sidecar
//! stores.

use bincode::config::{self, Config};

pub mod block;
pub(crate) mod cursor;
pub mod header;
pub mod key_index;
pub mod packed;
pub(crate) mod staging;
pub mod vectors;

/// Configuration shared by every bincode-encoded structure in an archive directory.
pub(crate) fn bincode_config() -> impl Config {
    config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}
