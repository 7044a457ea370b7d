//! Size-preserving substitution inside one FlateDecode stream
//!
//! The stream is inflated, the first occurrence of the old text is replaced,
//! and the result is deflated again. The new compressed form is then grown to
//! exactly the original compressed length by inserting empty stored blocks
//! (5 bytes each, decoding to nothing) before the final block:
//!
//! ```text
//! header(2) | raw deflate, sync flushed | 00 00 00 FF FF * n | 01 00 00 FF FF | adler32(4)
//! ```
//!
//! If the new form is already longer than the original, or the spare bytes are
//! not a multiple of 5, the stream cannot be patched in place.

use std::ops::Range;
use tracing::debug;

use super::codec::{self, DEFAULT_ZLIB_HEADER, EMPTY_STORED_BLOCK, FINAL_STORED_BLOCK};
use super::locate::{find, StreamCandidate};
use crate::error::{Error, Result};

/// Bytes of zlib framing around the deflate data: header plus Adler-32 trailer
const ZLIB_FRAMING: usize = 2 + 4;

/// Replacement bytes for one stream's compressed data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Range of the original compressed data in the document buffer
    pub range: Range<usize>,
    /// New compressed data, always exactly `range.len()` bytes
    pub replacement: Vec<u8>,
}

/// Why a stream was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The stream data is not valid zlib/deflate
    Decode(String),
    /// The old text does not occur in the decompressed stream
    NotFound,
    /// The recompressed stream is larger than the original
    SizeExceeded {
        original_len: usize,
        replacement_len: usize,
    },
    /// The spare bytes cannot be filled with whole empty stored blocks
    PaddingMismatch { shortfall: usize },
}

impl SkipReason {
    /// Whether this stream's outcome must abort the whole file
    pub fn is_fatal(&self) -> bool {
        matches!(self, SkipReason::SizeExceeded { .. } | SkipReason::PaddingMismatch { .. })
    }

    /// File-level error for a fatal reason, `None` for reasons that are just skipped
    pub fn into_error(self, offset: usize) -> Option<Error> {
        match self {
            SkipReason::SizeExceeded { original_len, replacement_len } => Some(Error::SizeExceeded {
                offset,
                original_len,
                replacement_len,
            }),
            SkipReason::PaddingMismatch { shortfall } => {
                Some(Error::PaddingMismatch { offset, shortfall })
            }
            SkipReason::Decode(_) | SkipReason::NotFound => None,
        }
    }
}

/// Outcome of patching one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchResult {
    Applied(Patch),
    Skipped(SkipReason),
}

/// Replace the first occurrence of `old` with `new` in one located stream
///
/// `buffer` is the whole document; only the candidate's data range is read.
/// Errors are limited to encoder failures. Everything that merely prevents
/// the patch is reported as [`PatchResult::Skipped`].
pub fn patch_stream(
    buffer: &[u8],
    candidate: &StreamCandidate,
    old: &[u8],
    new: &[u8],
) -> Result<PatchResult> {
    let original = &buffer[candidate.data_range()];

    let decoded = match codec::decompress(original) {
        Ok(decoded) => decoded,
        Err(e) => return Ok(PatchResult::Skipped(SkipReason::Decode(e.to_string()))),
    };

    debug!(
        offset = candidate.data_start,
        compressed = original.len(),
        decompressed = decoded.len(),
        "inflated stream"
    );

    let Some(pos) = find(&decoded, old, 0) else {
        return Ok(PatchResult::Skipped(SkipReason::NotFound));
    };

    let modified = replace_at(&decoded, pos, old.len(), new);
    let raw = codec::compress_raw(&modified)?;

    let header = match original {
        [a, b, ..] => [*a, *b],
        _ => DEFAULT_ZLIB_HEADER,
    };

    let unpadded_len = ZLIB_FRAMING + raw.len() + FINAL_STORED_BLOCK.len();
    if unpadded_len > original.len() {
        return Ok(PatchResult::Skipped(SkipReason::SizeExceeded {
            original_len: original.len(),
            replacement_len: unpadded_len,
        }));
    }

    let shortfall = original.len() - unpadded_len;
    if shortfall % EMPTY_STORED_BLOCK.len() != 0 {
        return Ok(PatchResult::Skipped(SkipReason::PaddingMismatch { shortfall }));
    }

    let padding_blocks = shortfall / EMPTY_STORED_BLOCK.len();
    let replacement = assemble(header, &raw, padding_blocks, codec::adler32(&modified));

    assert_eq!(
        replacement.len(),
        original.len(),
        "padded stream must match the original compressed length"
    );

    debug!(
        offset = candidate.data_start,
        raw = raw.len(),
        padding_blocks,
        "recompressed stream"
    );

    Ok(PatchResult::Applied(Patch {
        range: candidate.data_range(),
        replacement,
    }))
}

/// Build a zlib stream from sync-flushed raw deflate data
///
/// `padding_blocks` empty stored blocks go between the data and the final block.
pub fn assemble(header: [u8; 2], raw: &[u8], padding_blocks: usize, checksum: u32) -> Vec<u8> {
    let len = ZLIB_FRAMING
        + raw.len()
        + padding_blocks * EMPTY_STORED_BLOCK.len()
        + FINAL_STORED_BLOCK.len();

    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&header);
    out.extend_from_slice(raw);
    for _ in 0..padding_blocks {
        out.extend_from_slice(&EMPTY_STORED_BLOCK);
    }
    out.extend_from_slice(&FINAL_STORED_BLOCK);
    out.extend_from_slice(&checksum.to_be_bytes());
    out
}

fn replace_at(data: &[u8], pos: usize, old_len: usize, new: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() - old_len + new.len());
    out.extend_from_slice(&data[..pos]);
    out.extend_from_slice(new);
    out.extend_from_slice(&data[pos + old_len..]);
    out
}
