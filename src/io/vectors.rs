//! Paired dense-vector store (`vectors.bin`).
//!
//! Layout: 8 magic bytes, `u64` index length, the bincode-encoded [`VectorIndex`], then the
//! row data as little-endian `f32`. The index is stamped with the GUID of the archive it
//! belongs to and lists one dataset per `(document, code, stream)`, sorted by that key.
//! Rows of a dataset follow the code's on-disk entry order.

use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bincode::serde::{decode_from_slice, encode_to_vec};
use fs_err::{File, OpenOptions};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::constants::VECTORS_MAGIC;
use crate::error::{ArribaError, Result};
use crate::io::bincode_config;

const PREFIX_LEN: usize = VECTORS_MAGIC.len() + 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorDataset {
    pub document: u64,
    pub code: u32,
    pub stream: String,
    pub rows: u32,
    pub dim: u32,
    /// Byte offset of the first row within the data region.
    pub offset: u64,
}

impl VectorDataset {
    fn key(&self) -> (u64, u32, &str) {
        (self.document, self.code, self.stream.as_str())
    }

    fn byte_len(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.dim) * 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub guid: String,
    pub datasets: Vec<VectorDataset>,
}

/// Accumulates row data in a scratch file while documents are written.
#[derive(Debug)]
pub struct VectorStoreWriter {
    scratch_path: PathBuf,
    data: BufWriter<File>,
    datasets: Vec<VectorDataset>,
    data_len: u64,
}

impl VectorStoreWriter {
    pub fn create(scratch_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(scratch_path)?;
        Ok(Self {
            scratch_path: scratch_path.to_path_buf(),
            data: BufWriter::new(file),
            datasets: Vec::new(),
            data_len: 0,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    /// Appends one dataset. Datasets must arrive in ascending `(document, code, stream)`
    /// order; rows must share one dimension.
    pub fn add<R: AsRef<[f32]>>(
        &mut self,
        document: u64,
        code: u32,
        stream: &str,
        rows: &[R],
    ) -> Result<()> {
        if let Some(last) = self.datasets.last() {
            if last.key() >= (document, code, stream) {
                return Err(ArribaError::InvalidVector {
                    reason: format!(
                        "dataset ({document}, {code}, '{stream}') written out of order"
                    ),
                });
            }
        }
        let dim = rows.first().map_or(0, |row| row.as_ref().len());
        if let Some(bad) = rows.iter().position(|row| row.as_ref().len() != dim) {
            return Err(ArribaError::InvalidVector {
                reason: format!(
                    "row {bad} of stream '{stream}' has {} values, expected {dim}",
                    rows[bad].as_ref().len()
                ),
            });
        }
        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| ArribaError::EncodingRange {
                value: value as u64,
                max_bits: 32,
            })
        };
        let dataset = VectorDataset {
            document,
            code,
            stream: stream.to_string(),
            rows: to_u32(rows.len())?,
            dim: to_u32(dim)?,
            offset: self.data_len,
        };
        for row in rows {
            for value in row.as_ref() {
                self.data.write_all(&value.to_le_bytes())?;
            }
        }
        self.data_len += dataset.byte_len();
        self.datasets.push(dataset);
        Ok(())
    }

    /// Writes the finished store to `path`, stamped with `guid`.
    pub fn finish(self, guid: &str, path: &Path) -> Result<()> {
        let index = VectorIndex {
            guid: guid.to_string(),
            datasets: self.datasets,
        };
        let index_bytes = encode_to_vec(&index, bincode_config())?;

        let mut data = self
            .data
            .into_inner()
            .map_err(|err| ArribaError::Io(err.into_error()))?;
        data.seek(SeekFrom::Start(0))?;

        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&VECTORS_MAGIC)?;
        out.write_all(&(index_bytes.len() as u64).to_le_bytes())?;
        out.write_all(&index_bytes)?;
        let copied = std::io::copy(&mut data, &mut out)?;
        if copied != self.data_len {
            return Err(ArribaError::InvalidVector {
                reason: format!("copied {copied} of {} vector bytes", self.data_len),
            });
        }
        let out = out
            .into_inner()
            .map_err(|err| ArribaError::Io(err.into_error()))?;
        out.sync_all()?;
        tracing::debug!(
            vectors.path = %path.display(),
            vectors.scratch = %self.scratch_path.display(),
            vectors.datasets = index.datasets.len(),
            vectors.bytes = self.data_len,
            "vector store written"
        );
        Ok(())
    }
}

fn decode_index(bytes: &[u8], path: &Path) -> Result<(VectorIndex, usize)> {
    let invalid = |reason: String| ArribaError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.len() < PREFIX_LEN || bytes[..VECTORS_MAGIC.len()] != VECTORS_MAGIC {
        return Err(invalid("vector store magic missing".to_string()));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[VECTORS_MAGIC.len()..PREFIX_LEN]);
    let index_len = u64::from_le_bytes(len);
    let data_start = usize::try_from(index_len)
        .ok()
        .and_then(|len| len.checked_add(PREFIX_LEN))
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| invalid(format!("vector index length {index_len} exceeds file")))?;
    let (index, _) = decode_from_slice(&bytes[PREFIX_LEN..data_start], bincode_config())?;
    Ok((index, data_start))
}

/// Reads only the GUID stamp of a vector store.
pub fn peek_guid(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut prefix = [0u8; PREFIX_LEN];
    file.read_exact(&mut prefix)?;
    let mut len = [0u8; 8];
    len.copy_from_slice(&prefix[VECTORS_MAGIC.len()..]);
    let index_len = usize::try_from(u64::from_le_bytes(len)).map_err(|_| {
        ArribaError::InvalidArchive {
            path: path.to_path_buf(),
            reason: "vector index length overflows".to_string(),
        }
    })?;
    let file_len = file.metadata()?.len();
    if (index_len as u64).saturating_add(PREFIX_LEN as u64) > file_len {
        return Err(ArribaError::InvalidArchive {
            path: path.to_path_buf(),
            reason: format!("vector index length {index_len} exceeds file"),
        });
    }
    let mut bytes = prefix.to_vec();
    bytes.resize(PREFIX_LEN + index_len, 0);
    file.read_exact(&mut bytes[PREFIX_LEN..])?;
    Ok(decode_index(&bytes, path)?.0.guid)
}

/// Memory-mapped vector store.
#[derive(Debug)]
pub struct VectorStore {
    mmap: Mmap,
    index: VectorIndex,
    data_start: usize,
}

impl VectorStore {
    /// Maps the store at `path` and checks that it belongs to archive `guid`.
    pub fn open(path: &Path, guid: &str) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: read-only mapping of a file that is never mutated after finalize.
        let mmap = unsafe { Mmap::map(file.file())? };
        let (index, data_start) = decode_index(&mmap, path)?;
        if index.guid != guid {
            tracing::error!(
                vectors.path = %path.display(),
                vectors.guid = %index.guid,
                archive.guid = %guid,
                "vector store belongs to another archive"
            );
            return Err(ArribaError::ArchiveGuidMismatch {
                archive: guid.to_string(),
                vectors: index.guid,
            });
        }
        let data_len = (mmap.len() - data_start) as u64;
        for (position, dataset) in index.datasets.iter().enumerate() {
            let in_bounds = dataset
                .offset
                .checked_add(dataset.byte_len())
                .is_some_and(|end| end <= data_len);
            let ordered = position == 0 || index.datasets[position - 1].key() < dataset.key();
            if !in_bounds || !ordered {
                return Err(ArribaError::InvalidArchive {
                    path: path.to_path_buf(),
                    reason: format!(
                        "vector dataset ({}, {}, '{}') is malformed",
                        dataset.document, dataset.code, dataset.stream
                    ),
                });
            }
        }
        tracing::debug!(
            vectors.path = %path.display(),
            vectors.datasets = index.datasets.len(),
            "vector store opened"
        );
        Ok(Self {
            mmap,
            index,
            data_start,
        })
    }

    #[must_use]
    pub fn guid(&self) -> &str {
        &self.index.guid
    }

    #[must_use]
    pub fn datasets(&self) -> &[VectorDataset] {
        &self.index.datasets
    }

    #[must_use]
    pub fn dataset(&self, document: u64, code: u32, stream: &str) -> Option<&VectorDataset> {
        self.index
            .datasets
            .binary_search_by(|dataset| dataset.key().cmp(&(document, code, stream)))
            .ok()
            .map(|at| &self.index.datasets[at])
    }

    /// Stream names stored for one code of one document.
    #[must_use]
    pub fn streams(&self, document: u64, code: u32) -> Vec<&str> {
        let from = self
            .index
            .datasets
            .partition_point(|dataset| (dataset.document, dataset.code) < (document, code));
        self.index.datasets[from..]
            .iter()
            .take_while(|dataset| dataset.document == document && dataset.code == code)
            .map(|dataset| dataset.stream.as_str())
            .collect()
    }

    /// Row `row` of a dataset, `None` when the dataset or row does not exist.
    #[must_use]
    pub fn row(&self, document: u64, code: u32, stream: &str, row: usize) -> Option<Vec<f32>> {
        let dataset = self.dataset(document, code, stream)?;
        if row >= dataset.rows as usize {
            return None;
        }
        let dim = dataset.dim as usize;
        let start = self.data_start + dataset.offset as usize + row * dim * 4;
        let bytes = &self.mmap[start..start + dim * 4];
        Some(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}
