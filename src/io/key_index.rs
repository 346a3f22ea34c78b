//! Lookup index from external keys and text fingerprints to document indices (`index.bin`).

use std::path::Path;

use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::TEXT_FINGERPRINT_BYTES;
use crate::error::{ArribaError, Result};
use crate::io::bincode_config;

/// Short blake3 prefix of a document's text. Collisions are resolved by comparing text.
#[must_use]
pub fn text_fingerprint(text: &str) -> u32 {
    let digest = blake3::hash(text.as_bytes());
    let mut prefix = [0u8; TEXT_FINGERPRINT_BYTES];
    prefix.copy_from_slice(&digest.as_bytes()[..TEXT_FINGERPRINT_BYTES]);
    u32::from_le_bytes(prefix)
}

/// Canonical (compact, key-sorted) JSON of an external key.
pub fn canonical_key(key: &Value) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIndex {
    pub guid: String,
    /// `(canonical key, document)`, sorted.
    keys: Vec<(String, u32)>,
    /// `(fingerprint, document)`, sorted.
    fingerprints: Vec<(u32, u32)>,
}

impl KeyIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Documents whose external key equals `key`, ascending.
    pub fn find_key(&self, key: &Value) -> Result<Vec<usize>> {
        let key = canonical_key(key)?;
        let from = self.keys.partition_point(|(k, _)| k.as_str() < key.as_str());
        Ok(self.keys[from..]
            .iter()
            .take_while(|(k, _)| *k == key)
            .map(|&(_, document)| document as usize)
            .collect())
    }

    /// Documents whose text fingerprint matches `text`; candidates, not confirmed matches.
    #[must_use]
    pub fn text_candidates(&self, text: &str) -> Vec<usize> {
        let fingerprint = text_fingerprint(text);
        let from = self.fingerprints.partition_point(|&(f, _)| f < fingerprint);
        self.fingerprints[from..]
            .iter()
            .take_while(|&&(f, _)| f == fingerprint)
            .map(|&(_, document)| document as usize)
            .collect()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = encode_to_vec(self, bincode_config())?;
        fs_err::write(path, bytes)?;
        Ok(())
    }

    /// Loads the index at `path`, which must belong to archive `guid`.
    pub fn read(path: &Path, guid: &str) -> Result<Self> {
        let bytes = fs_err::read(path)?;
        let (index, _): (Self, usize) = decode_from_slice(&bytes, bincode_config())?;
        if index.guid != guid {
            return Err(ArribaError::InvalidArchive {
                path: path.to_path_buf(),
                reason: format!("key index belongs to archive {}", index.guid),
            });
        }
        Ok(index)
    }
}

/// Collects entries while documents are written.
#[derive(Debug, Default)]
pub struct KeyIndexBuilder {
    keys: Vec<(String, u32)>,
    fingerprints: Vec<(u32, u32)>,
}

impl KeyIndexBuilder {
    pub fn add(&mut self, document: u32, text: &str, key: Option<&Value>) -> Result<()> {
        if let Some(key) = key {
            self.keys.push((canonical_key(key)?, document));
        }
        self.fingerprints.push((text_fingerprint(text), document));
        Ok(())
    }

    #[must_use]
    pub fn build(mut self, guid: &str) -> KeyIndex {
        self.keys.sort_unstable();
        self.fingerprints.sort_unstable();
        KeyIndex {
            guid: guid.to_string(),
            keys: self.keys,
            fingerprints: self.fingerprints,
        }
    }
}
