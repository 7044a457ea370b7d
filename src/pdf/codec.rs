//! Deflate codec for FlateDecode streams
//!
//! Decoding accepts the conventional zlib-wrapped FlateDecode encoding.
//! Encoding produces raw (headerless) DEFLATE that ends in a sync flush, so the
//! output is byte aligned and more blocks can be appended to it afterwards.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use crate::error::{Error, Result};

/// Empty non-final stored block, used as padding (BFINAL=0, LEN=0, NLEN=0xFFFF)
pub const EMPTY_STORED_BLOCK: [u8; 5] = [0x00, 0x00, 0x00, 0xFF, 0xFF];

/// Empty final stored block, closes the deflate stream
pub const FINAL_STORED_BLOCK: [u8; 5] = [0x01, 0x00, 0x00, 0xFF, 0xFF];

/// zlib header used when the original stream is too short to supply one
pub const DEFAULT_ZLIB_HEADER: [u8; 2] = [0x78, 0xDA];

/// Minimum spare output capacity kept free before each codec call
const MIN_SPARE: usize = 64;

/// Inflate a zlib-wrapped FlateDecode stream
///
/// The stream must run to its end marker and carry a valid Adler-32 trailer.
/// Bytes after the trailer are ignored.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut output = Vec::with_capacity(data.len().saturating_mul(4).max(MIN_SPARE));

    loop {
        if output.capacity() - output.len() < MIN_SPARE {
            output.reserve(output.capacity().max(MIN_SPARE));
        }

        let in_before = inflater.total_in();
        let out_before = inflater.total_out();
        let consumed = in_before as usize;

        let status = inflater
            .decompress_vec(&data[consumed..], &mut output, FlushDecompress::None)
            .map_err(|e| Error::Decode(e.to_string()))?;

        if status == Status::StreamEnd {
            return Ok(output);
        }

        // No progress with spare output room means the input ran out mid-stream
        if inflater.total_in() == in_before && inflater.total_out() == out_before {
            return Err(Error::Decode(format!(
                "truncated deflate stream after {} of {} bytes",
                consumed,
                data.len()
            )));
        }
    }
}

/// Compress `data` as raw DEFLATE at maximum level, ending in a sync flush
///
/// No final block is written: the caller closes the stream, typically with
/// [`FINAL_STORED_BLOCK`] after any [`EMPTY_STORED_BLOCK`] padding.
pub fn compress_raw(data: &[u8]) -> Result<Vec<u8>> {
    let mut compressor = Compress::new(Compression::best(), false);
    let mut output = Vec::with_capacity(data.len() / 2 + MIN_SPARE);

    loop {
        if output.capacity() - output.len() < MIN_SPARE {
            output.reserve(output.capacity().max(MIN_SPARE));
        }

        let consumed = compressor.total_in() as usize;
        compressor
            .compress_vec(&data[consumed..], &mut output, FlushCompress::Sync)
            .map_err(|e| Error::Encode(e.to_string()))?;

        // Flush is complete once all input is in and the output buffer was not filled
        if compressor.total_in() as usize == data.len() && output.len() < output.capacity() {
            return Ok(output);
        }
    }
}

/// Adler-32 checksum as used in the zlib trailer
pub fn adler32(data: &[u8]) -> u32 {
    adler2::adler32_slice(data)
}
