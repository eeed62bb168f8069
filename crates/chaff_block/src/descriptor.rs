// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! File descriptors and their wire format.
//!
//! The descriptor is a file's public handle: stored through the blob store
//! like any other payload, its cid is what gets shared. The normative
//! encoding is the fixed binary layout implemented here; a canonical-JSON
//! alternative exists behind the `json` feature for deployments that prefer
//! a self-describing text form.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use chaff_store::Cid;

use crate::{BLOCK_SIZE, Error, Result};

/// The cid triple recorded for one logical block.
///
/// `data` addresses the anonymized block, `rand1` and `rand2` the two
/// randomizers XORed into it. The positions are fixed for byte-exact
/// interoperability even though XOR makes them interchangeable for
/// reconstruction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Triple {
    /// Cid of the anonymized block.
    pub data: Cid,
    /// Cid of the first randomizer.
    pub rand1: Cid,
    /// Cid of the second randomizer.
    pub rand2: Cid,
}

impl Triple {
    /// Creates a triple, rejecting self-cancelling randomizer pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRandomizers`] if both randomizer cids are
    /// equal; `index` is only used for the error report.
    pub fn new(data: Cid, rand1: Cid, rand2: Cid, index: u64) -> Result<Self> {
        if rand1 == rand2 {
            return Err(Error::DuplicateRandomizers { index, cid: rand1 });
        }
        Ok(Self { data, rand1, rand2 })
    }

    /// The three cids in canonical order.
    #[must_use]
    pub fn cids(&self) -> [&Cid; 3] {
        [&self.data, &self.rand1, &self.rand2]
    }
}

/// The manifest allowing reconstruction of a file from its triples.
///
/// Immutable once built; uploads accumulate through [`DescriptorBuilder`].
///
/// # Examples
///
/// ```
/// use chaff_block::{BLOCK_SIZE, Descriptor, DescriptorBuilder, Triple};
/// use chaff_store::Cid;
///
/// let mut builder = DescriptorBuilder::new("notes.txt");
/// builder.push(Triple::new(
///     Cid::from("d0"),
///     Cid::from("r1"),
///     Cid::from("r2"),
///     0,
/// )?);
/// let descriptor = builder.build(10)?;
///
/// let wire = descriptor.encode()?;
/// assert_eq!(Descriptor::decode(&wire)?, descriptor);
/// # Ok::<(), chaff_block::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Descriptor {
    filename: String,
    file_size: u64,
    block_size: u32,
    blocks: Vec<Triple>,
}

impl Descriptor {
    /// The original file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The original file size in bytes; the final block's zero padding is
    /// trimmed against this on reconstruction.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The block size the file was split with.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// The ordered cid triples, one per logical block.
    #[must_use]
    pub fn blocks(&self) -> &[Triple] {
        &self.blocks
    }

    /// Number of logical blocks.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Rejects descriptors whose block size differs from this build's.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBlockSize`] on disagreement.
    pub fn require_native_block_size(&self) -> Result<()> {
        if self.block_size as usize != BLOCK_SIZE {
            return Err(Error::UnsupportedBlockSize {
                actual: self.block_size,
                supported: BLOCK_SIZE as u32,
            });
        }
        Ok(())
    }

    /// The range of block indices that intersect the byte range `[start, end)`.
    ///
    /// An empty byte range yields an empty block range.
    #[must_use]
    pub fn blocks_for_byte_range(&self, start: u64, end: u64) -> std::ops::Range<u64> {
        if start >= end {
            return 0..0;
        }
        let bs = u64::from(self.block_size);
        let first = start / bs;
        let last = end.div_ceil(bs).min(self.block_count());
        first.min(last)..last
    }

    /// How many payload bytes block `index` contributes to the file.
    ///
    /// Every block but the last contributes a full block; the last one
    /// contributes the remainder.
    #[must_use]
    pub fn payload_len(&self, index: u64) -> u64 {
        let bs = u64::from(self.block_size);
        let start = index * bs;
        self.file_size.saturating_sub(start).min(bs)
    }

    /// Encodes the descriptor into its normative binary form.
    ///
    /// Layout, all integers big-endian, all strings length-prefixed (`u16`)
    /// UTF-8: filename, `file_size: u64`, `block_size: u32`,
    /// `block_count: u32`, then per block the data, rand1 and rand2 cids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldTooLarge`] if the filename or block count does
    /// not fit its wire bound.
    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.encoded_len_hint());

        put_str(&mut out, &self.filename, "filename")?;
        out.put_u64(self.file_size);
        out.put_u32(self.block_size);
        let count = u32::try_from(self.blocks.len())
            .map_err(|_overflow| Error::FieldTooLarge {
                context: "block_count",
            })?;
        out.put_u32(count);
        for triple in &self.blocks {
            for cid in triple.cids() {
                put_str(&mut out, cid.as_str(), "cid")?;
            }
        }

        Ok(out.freeze())
    }

    /// Decodes and validates a descriptor from its binary form.
    ///
    /// # Errors
    ///
    /// Returns a decoding error for truncated or malformed input, and a
    /// validation error if the content violates the descriptor invariants
    /// (block count agreement, distinct randomizers, cid length bound).
    pub fn decode(mut wire: &[u8]) -> Result<Self> {
        let filename = take_str(&mut wire, "filename")?;
        if wire.remaining() < 8 + 4 + 4 {
            return Err(Error::Truncated { context: "header" });
        }
        let file_size = wire.get_u64();
        let block_size = wire.get_u32();
        let block_count = wire.get_u32();

        let mut blocks = Vec::with_capacity(block_count as usize);
        for index in 0..u64::from(block_count) {
            let data = take_cid(&mut wire)?;
            let rand1 = take_cid(&mut wire)?;
            let rand2 = take_cid(&mut wire)?;
            blocks.push(Triple::new(data, rand1, rand2, index)?);
        }

        if wire.has_remaining() {
            return Err(Error::TrailingBytes(wire.remaining()));
        }

        Self::validated(filename, file_size, block_size, blocks)
    }

    /// Encodes the descriptor as canonical JSON.
    ///
    /// The binary form is normative; this exists for interoperability with
    /// deployments that exchange text descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and validates a descriptor from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON and a validation error if
    /// the content violates the descriptor invariants.
    #[cfg(feature = "json")]
    pub fn from_json(text: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(text)?;
        Self::validated(
            parsed.filename,
            parsed.file_size,
            parsed.block_size,
            parsed.blocks,
        )
    }

    fn validated(
        filename: String,
        file_size: u64,
        block_size: u32,
        blocks: Vec<Triple>,
    ) -> Result<Self> {
        let required = if block_size == 0 {
            0
        } else {
            file_size.div_ceil(u64::from(block_size))
        };
        if blocks.len() as u64 != required {
            return Err(Error::BlockCountMismatch {
                listed: blocks.len() as u64,
                required,
            });
        }
        for (index, triple) in blocks.iter().enumerate() {
            if triple.rand1 == triple.rand2 {
                return Err(Error::DuplicateRandomizers {
                    index: index as u64,
                    cid: triple.rand1.clone(),
                });
            }
        }
        Ok(Self {
            filename,
            file_size,
            block_size,
            blocks,
        })
    }

    fn encoded_len_hint(&self) -> usize {
        2 + self.filename.len() + 8 + 4 + 4 + self.blocks.len() * 3 * (2 + 64)
    }
}

/// Accumulates triples during an upload and validates the result.
///
/// Triples must be pushed in block order; the upload collector is
/// responsible for reordering worker completions first.
#[derive(Debug)]
pub struct DescriptorBuilder {
    filename: String,
    blocks: Vec<Triple>,
}

impl DescriptorBuilder {
    /// Starts a descriptor for `filename` at the native block size.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            blocks: Vec::new(),
        }
    }

    /// Appends the triple for the next block in order.
    pub fn push(&mut self, triple: Triple) {
        self.blocks.push(triple);
    }

    /// Number of triples accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no triple has been pushed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Finishes the descriptor against the final source size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockCountMismatch`] if the accumulated triples
    /// disagree with `ceil(file_size / block_size)`.
    pub fn build(self, file_size: u64) -> Result<Descriptor> {
        Descriptor::validated(self.filename, file_size, BLOCK_SIZE as u32, self.blocks)
    }
}

fn put_str(out: &mut BytesMut, text: &str, context: &'static str) -> Result<()> {
    let len = u16::try_from(text.len()).map_err(|_overflow| Error::FieldTooLarge { context })?;
    out.put_u16(len);
    out.put_slice(text.as_bytes());
    Ok(())
}

fn take_str(wire: &mut &[u8], context: &'static str) -> Result<String> {
    if wire.remaining() < 2 {
        return Err(Error::Truncated { context });
    }
    let len = wire.get_u16() as usize;
    if wire.remaining() < len {
        return Err(Error::Truncated { context });
    }
    let raw = wire[..len].to_vec();
    wire.advance(len);
    String::from_utf8(raw).map_err(|_bad_utf8| Error::InvalidUtf8 { context })
}

fn take_cid(wire: &mut &[u8]) -> Result<Cid> {
    let text = take_str(wire, "cid")?;
    if text.len() > Cid::MAX_LEN {
        return Err(Error::CidTooLong {
            len: text.len(),
            max: Cid::MAX_LEN,
        });
    }
    Ok(Cid::from(text))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn triple(n: u64) -> Triple {
        Triple::new(
            Cid::from(format!("data-{n}")),
            Cid::from(format!("rand-{n}-a")),
            Cid::from(format!("rand-{n}-b")),
            n,
        )
        .expect("distinct randomizers")
    }

    fn three_block_descriptor() -> Descriptor {
        let mut builder = DescriptorBuilder::new("sample.bin");
        for n in 0..3 {
            builder.push(triple(n));
        }
        builder.build(BLOCK_SIZE as u64 * 2 + 17).expect("valid")
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let descriptor = three_block_descriptor();
        let wire = descriptor.encode().expect("encode");
        assert_eq!(Descriptor::decode(&wire).expect("decode"), descriptor);
    }

    #[test]
    fn decode_rejects_truncation_at_every_boundary() {
        let wire = three_block_descriptor().encode().expect("encode");
        for cut in 0..wire.len() {
            assert!(
                Descriptor::decode(&wire[..cut]).is_err(),
                "cut at {cut} must not decode"
            );
        }
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut wire = three_block_descriptor().encode().expect("encode").to_vec();
        wire.push(0);
        assert!(matches!(
            Descriptor::decode(&wire),
            Err(Error::TrailingBytes(1))
        ));
    }

    #[test]
    fn builder_enforces_block_count() {
        let mut builder = DescriptorBuilder::new("short.bin");
        builder.push(triple(0));
        let err = builder.build(BLOCK_SIZE as u64 + 1).expect_err("one block short");
        assert!(matches!(
            err,
            Error::BlockCountMismatch {
                listed: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn equal_randomizers_are_rejected() {
        let err = Triple::new(Cid::from("d"), Cid::from("r"), Cid::from("r"), 7)
            .expect_err("self-cancelling");
        assert!(matches!(err, Error::DuplicateRandomizers { index: 7, .. }));
    }

    #[test]
    fn byte_range_maps_to_block_range() {
        let descriptor = three_block_descriptor();
        let bs = BLOCK_SIZE as u64;

        assert_eq!(descriptor.blocks_for_byte_range(0, 1), 0..1);
        assert_eq!(descriptor.blocks_for_byte_range(bs - 1, bs + 1), 0..2);
        assert_eq!(descriptor.blocks_for_byte_range(bs, 2 * bs), 1..2);
        assert_eq!(descriptor.blocks_for_byte_range(0, 0), 0..0);
        // Clamped to the real block count even for ranges past EOF.
        assert_eq!(descriptor.blocks_for_byte_range(0, 10 * bs), 0..3);
    }

    #[test]
    fn payload_len_trims_only_the_last_block() {
        let descriptor = three_block_descriptor();
        let bs = BLOCK_SIZE as u64;

        assert_eq!(descriptor.payload_len(0), bs);
        assert_eq!(descriptor.payload_len(1), bs);
        assert_eq!(descriptor.payload_len(2), 17);
    }

    #[test]
    fn empty_file_descriptor_has_no_blocks() {
        let descriptor = DescriptorBuilder::new("empty").build(0).expect("valid");
        assert_eq!(descriptor.block_count(), 0);
        let wire = descriptor.encode().expect("encode");
        assert_eq!(Descriptor::decode(&wire).expect("decode"), descriptor);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_round_trip_is_exact() {
        let descriptor = three_block_descriptor();
        let text = descriptor.to_json().expect("encode");
        assert_eq!(Descriptor::from_json(&text).expect("decode"), descriptor);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_decode_validates_invariants() {
        let mut builder = DescriptorBuilder::new("bad.bin");
        builder.push(triple(0));
        let descriptor = builder.build(10).expect("valid");

        let tampered = descriptor
            .to_json()
            .expect("encode")
            .replace("rand-0-b", "rand-0-a");
        assert!(matches!(
            Descriptor::from_json(&tampered),
            Err(Error::DuplicateRandomizers { .. })
        ));
    }
}
