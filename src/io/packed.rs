//! Width-adaptive packed integer sequences.
//!
//! A sequence is stored in the narrowest of `u8`/`u16`/`u32`/`u64` that holds its maximum.
//! The empty sequence has its own [`Width::None`] tag and no payload. On disk a sequence is
//! `u8 width tag`, `u32 count`, then `count * width` little-endian bytes; reading hands out a
//! [`PackedInts`] view that decodes elements in place from the mapped bytes.

use crate::error::{ArribaError, Result};
use crate::io::cursor::{ByteReader, ByteSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Width {
    None = 0,
    U8 = 1,
    U16 = 2,
    U32 = 4,
    U64 = 8,
}

impl Width {
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }

    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Bytes per element.
    #[must_use]
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Narrowest non-empty width holding `max`.
    #[must_use]
    pub fn for_max(max: u64) -> Self {
        if max <= u64::from(u8::MAX) {
            Self::U8
        } else if max <= u64::from(u16::MAX) {
            Self::U16
        } else if max <= u64::from(u32::MAX) {
            Self::U32
        } else {
            Self::U64
        }
    }
}

/// Owned result of [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBuf {
    width: Width,
    len: usize,
    bytes: Vec<u8>,
}

impl PackedBuf {
    #[must_use]
    pub fn width(&self) -> Width {
        self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn view(&self) -> PackedInts<'_> {
        PackedInts {
            width: self.width,
            len: self.len,
            bytes: &self.bytes,
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u32::try_from(self.len).map_err(|_| ArribaError::EncodingRange {
            value: self.len as u64,
            max_bits: 32,
        })?;
        out.put_u8(self.width.tag());
        out.put_u32(count);
        out.extend_from_slice(&self.bytes);
        Ok(())
    }
}

/// Packs `values` into the narrowest width that fits their maximum.
///
/// Without `allow_u64` the widest permitted width is `u32`, and any larger value fails with
/// [`ArribaError::EncodingRange`].
pub fn encode(values: &[u64], allow_u64: bool) -> Result<PackedBuf> {
    let Some(&max) = values.iter().max() else {
        return Ok(PackedBuf {
            width: Width::None,
            len: 0,
            bytes: Vec::new(),
        });
    };

    let width = Width::for_max(max);
    if width == Width::U64 && !allow_u64 {
        return Err(ArribaError::EncodingRange {
            value: max,
            max_bits: 32,
        });
    }

    let mut bytes = Vec::with_capacity(values.len() * width.bytes());
    match width {
        Width::None => {}
        Width::U8 => bytes.extend(values.iter().map(|&v| v as u8)),
        Width::U16 => {
            for &v in values {
                bytes.extend_from_slice(&(v as u16).to_le_bytes());
            }
        }
        Width::U32 => {
            for &v in values {
                bytes.extend_from_slice(&(v as u32).to_le_bytes());
            }
        }
        Width::U64 => {
            for &v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    Ok(PackedBuf {
        width,
        len: values.len(),
        bytes,
    })
}

/// Convenience for `usize`/`u32` inputs.
pub fn encode_iter<I>(values: I, allow_u64: bool) -> Result<PackedBuf>
where
    I: IntoIterator,
    I::Item: Into<u64>,
{
    let values: Vec<u64> = values.into_iter().map(Into::into).collect();
    encode(&values, allow_u64)
}

/// Zero-copy view over a packed sequence.
#[derive(Debug, Clone, Copy)]
pub struct PackedInts<'a> {
    width: Width,
    len: usize,
    bytes: &'a [u8],
}

impl<'a> PackedInts<'a> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            width: Width::None,
            len: 0,
            bytes: &[],
        }
    }

    /// Wraps raw little-endian bytes tagged with `width_tag`; `None` when the tag is unknown
    /// or the byte count is not a whole number of elements.
    #[must_use]
    pub fn from_raw(width_tag: u8, bytes: &'a [u8]) -> Option<Self> {
        let width = Width::from_tag(width_tag)?;
        if width == Width::None {
            return bytes.is_empty().then(Self::empty);
        }
        if bytes.len() % width.bytes() != 0 {
            return None;
        }
        Some(Self {
            width,
            len: bytes.len() / width.bytes(),
            bytes,
        })
    }

    pub(crate) fn read(reader: &mut ByteReader<'a>, what: &str) -> Result<Self> {
        let tag = reader.read_u8(what)?;
        let width = Width::from_tag(tag)
            .ok_or_else(|| reader.error(format!("{what}: unknown packed width tag {tag}")))?;
        let count = reader.read_u32(what)? as usize;
        if width == Width::None {
            if count != 0 {
                return Err(reader.error(format!("{what}: empty sequence with count {count}")));
            }
            return Ok(Self::empty());
        }
        let byte_len = count
            .checked_mul(width.bytes())
            .ok_or_else(|| reader.error(format!("{what}: element count overflows")))?;
        let bytes = reader.take(byte_len, what)?;
        Ok(Self {
            width,
            len: count,
            bytes,
        })
    }

    #[must_use]
    pub fn width(&self) -> Width {
        self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<u64> {
        (index < self.len).then(|| self.value(index))
    }

    /// Element at `index`; the caller guarantees `index < len`.
    #[inline]
    pub(crate) fn value(&self, index: usize) -> u64 {
        let b = self.bytes;
        match self.width {
            Width::None => 0,
            Width::U8 => u64::from(b[index]),
            Width::U16 => {
                let at = index * 2;
                u64::from(u16::from_le_bytes([b[at], b[at + 1]]))
            }
            Width::U32 => {
                let at = index * 4;
                u64::from(u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]))
            }
            Width::U64 => {
                let at = index * 8;
                let mut word = [0u8; 8];
                word.copy_from_slice(&b[at..at + 8]);
                u64::from_le_bytes(word)
            }
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.value(i))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }

    /// First index whose element is `>= target`, assuming ascending order.
    #[must_use]
    pub fn lower_bound(&self, target: u64) -> usize {
        let (mut lo, mut hi) = (0, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.value(mid) < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Position of `target` in an ascending sequence.
    #[must_use]
    pub fn binary_search(&self, target: u64) -> Option<usize> {
        let at = self.lower_bound(target);
        (at < self.len && self.value(at) == target).then_some(at)
    }

    /// True when every element is strictly greater than its predecessor.
    #[must_use]
    pub fn is_strictly_ascending(&self) -> bool {
        (1..self.len).all(|i| self.value(i - 1) < self.value(i))
    }

    /// Largest element, or `None` for the empty sequence.
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.iter().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: &[u64], allow_u64: bool) -> PackedBuf {
        let packed = encode(values, allow_u64).expect("encode");
        let view = PackedInts::from_raw(packed.width().tag(), packed.bytes()).expect("view");
        assert_eq!(view.to_vec(), values);
        packed
    }

    #[test]
    fn empty_sequence_uses_none_tag() {
        let packed = roundtrip(&[], false);
        assert_eq!(packed.width(), Width::None);
        assert!(packed.bytes().is_empty());
    }

    #[test]
    fn picks_narrowest_width() {
        assert_eq!(roundtrip(&[0, 0, 0], false).width(), Width::U8);
        assert_eq!(roundtrip(&[1, 255], false).width(), Width::U8);
        assert_eq!(roundtrip(&[256, 3], false).width(), Width::U16);
        assert_eq!(roundtrip(&[65_535], false).width(), Width::U16);
        assert_eq!(roundtrip(&[65_536], false).width(), Width::U32);
        assert_eq!(roundtrip(&[u64::from(u32::MAX)], false).width(), Width::U32);
        assert_eq!(roundtrip(&[u64::from(u32::MAX) + 1], true).width(), Width::U64);
    }

    #[test]
    fn wide_values_need_the_u64_flag() {
        let err = encode(&[1, u64::from(u32::MAX) + 7], false).expect_err("must not truncate");
        match err {
            ArribaError::EncodingRange { value, max_bits } => {
                assert_eq!(value, u64::from(u32::MAX) + 7);
                assert_eq!(max_bits, 32);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn random_sequences_survive_and_stay_minimal() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..200 {
            let bits = rng.u32(1..=40);
            let len = rng.usize(0..64);
            let values: Vec<u64> = (0..len).map(|_| rng.u64(0..(1u64 << bits))).collect();
            let packed = roundtrip(&values, true);
            if let Some(&max) = values.iter().max() {
                assert_eq!(packed.width(), Width::for_max(max));
            }
        }
    }

    #[test]
    fn lower_bound_matches_partition_point() {
        let values = [1u64, 3, 3, 7, 9, 300];
        let packed = encode(&values, false).expect("encode");
        let view = packed.view();
        for target in 0..310 {
            assert_eq!(
                view.lower_bound(target),
                values.partition_point(|&v| v < target),
                "target {target}"
            );
        }
        assert_eq!(view.binary_search(7), Some(3));
        assert_eq!(view.binary_search(8), None);
    }

    #[test]
    fn serialized_form_reads_back() {
        let packed = encode(&[5, 70_000, 2], false).expect("encode");
        let mut buf = Vec::new();
        packed.write_to(&mut buf).expect("write");
        buf.push(0xEE);

        let mut reader = ByteReader::new(&buf, 0);
        let view = PackedInts::read(&mut reader, "values").expect("read");
        assert_eq!(view.width(), Width::U32);
        assert_eq!(view.to_vec(), vec![5, 70_000, 2]);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn rejects_bad_width_tag() {
        assert!(PackedInts::from_raw(3, &[0, 0, 0]).is_none());
        assert!(PackedInts::from_raw(2, &[0, 0, 0]).is_none());
        assert!(PackedInts::from_raw(0, &[1]).is_none());
    }
}
