//! Format constants shared by the writer and the reader.

/// Archive format revision understood by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Engine tag written to `meta.json`.
pub const ENGINE: &str = "arriba";

/// Value of the `type` field in `meta.json`.
pub const ARCHIVE_TYPE: &str = "archive";

pub const META_FILE: &str = "meta.json";
pub const ARCHIVE_FILE: &str = "archive.bin";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const INDEX_FILE: &str = "index.bin";

/// Leading bytes of `vectors.bin`.
pub const VECTORS_MAGIC: [u8; 8] = *b"ARBVEC\x01\0";

/// Size of the `u64` header-length prefix at the start of `archive.bin`.
pub const HEADER_LEN_PREFIX: usize = 8;

/// Bytes of the blake3 digest kept as a text fingerprint in the key index.
pub const TEXT_FINGERPRINT_BYTES: usize = 4;

/// Prefix of the staging directory created next to the output path.
pub const STAGING_PREFIX: &str = ".arriba-staging-";
