//! FlateDecode stream discovery by raw byte scanning
//!
//! No PDF object model is built here. The scanner looks for `stream` /
//! `endstream` keyword pairs, checks the bytes between the nearest preceding
//! `<<` and the `stream` keyword for `/FlateDecode`, and reports the byte
//! offsets of the stream data.
//!
//! The dictionary check does not balance nested `<< >>` pairs. A filter name
//! inside a nested dictionary, or one belonging to a dictionary further back,
//! can be attributed to the wrong stream. This is a known limitation and is
//! kept as-is.

use std::ops::Range;
use tracing::trace;

const STREAM: &[u8] = b"stream";
const ENDSTREAM: &[u8] = b"endstream";
const DICT_OPEN: &[u8] = b"<<";
const FLATE_DECODE: &[u8] = b"/FlateDecode";

/// Byte offsets of one FlateDecode stream found in a document buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCandidate {
    /// Offset of the `<<` that opens the stream's dictionary
    pub dict_start: usize,
    /// Offset of the `stream` keyword
    pub stream_keyword: usize,
    /// First byte of stream data, after the optional end-of-line
    pub data_start: usize,
    /// One past the last byte of stream data, before the optional end-of-line
    pub data_end: usize,
    /// Offset of the `endstream` keyword
    pub endstream: usize,
}

impl StreamCandidate {
    /// Range of the compressed stream data
    pub fn data_range(&self) -> Range<usize> {
        self.data_start..self.data_end
    }

    /// Number of compressed bytes in the stream
    pub fn data_len(&self) -> usize {
        self.data_end - self.data_start
    }

    /// Offset just past the `endstream` keyword, where scanning resumes
    pub fn resume_offset(&self) -> usize {
        self.endstream + ENDSTREAM.len()
    }
}

/// Scanner state between two keyword searches
#[derive(Debug, Clone, Copy)]
enum ScanState {
    /// Looking for the next `stream` keyword from this offset
    Searching(usize),
    /// A keyword pair was found, the dictionary is not checked yet
    Validating { stream_keyword: usize, endstream: usize },
    /// The dictionary names `/FlateDecode`, data offsets are still to compute
    Extracting {
        dict_start: usize,
        stream_keyword: usize,
        endstream: usize,
    },
    /// No further keyword pair exists
    Finished,
}

/// Lazy left-to-right iterator over the FlateDecode streams of a buffer
///
/// # Example
///
/// ```
/// use pdf_stream_patch::pdf::StreamLocator;
///
/// let pdf = b"1 0 obj << /Filter /FlateDecode /Length 3 >>\nstream\nabc\nendstream endobj";
/// let streams: Vec<_> = StreamLocator::new(pdf).collect();
///
/// assert_eq!(streams.len(), 1);
/// assert_eq!(&pdf[streams[0].data_range()], b"abc");
/// ```
pub struct StreamLocator<'a> {
    data: &'a [u8],
    state: ScanState,
}

impl<'a> StreamLocator<'a> {
    /// Scan the whole buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self::starting_at(data, 0)
    }

    /// Scan the buffer from `offset` onwards
    pub fn starting_at(data: &'a [u8], offset: usize) -> Self {
        StreamLocator {
            data,
            state: ScanState::Searching(offset),
        }
    }
}

impl Iterator for StreamLocator<'_> {
    type Item = StreamCandidate;

    fn next(&mut self) -> Option<StreamCandidate> {
        loop {
            match self.state {
                ScanState::Searching(from) => {
                    self.state = match find(self.data, STREAM, from) {
                        Some(stream_keyword) => match find(self.data, ENDSTREAM, stream_keyword) {
                            Some(endstream) => ScanState::Validating { stream_keyword, endstream },
                            None => ScanState::Finished,
                        },
                        None => ScanState::Finished,
                    };
                }
                ScanState::Validating { stream_keyword, endstream } => {
                    let resume = endstream + ENDSTREAM.len();
                    self.state = match rfind(self.data, DICT_OPEN, stream_keyword) {
                        Some(dict_start)
                            if find(&self.data[dict_start..stream_keyword], FLATE_DECODE, 0)
                                .is_some() =>
                        {
                            ScanState::Extracting { dict_start, stream_keyword, endstream }
                        }
                        Some(dict_start) => {
                            trace!(dict_start, stream_keyword, "stream is not FlateDecode");
                            ScanState::Searching(resume)
                        }
                        None => {
                            trace!(stream_keyword, "stream has no dictionary");
                            ScanState::Searching(resume)
                        }
                    };
                }
                ScanState::Extracting { dict_start, stream_keyword, endstream } => {
                    let data_start = skip_eol(self.data, stream_keyword + STREAM.len());
                    let data_end = trim_eol(self.data, endstream).max(data_start);
                    self.state = ScanState::Searching(endstream + ENDSTREAM.len());

                    return Some(StreamCandidate {
                        dict_start,
                        stream_keyword,
                        data_start,
                        data_end,
                        endstream,
                    });
                }
                ScanState::Finished => return None,
            }
        }
    }
}

/// Collect every FlateDecode stream in the buffer
pub fn find_streams(data: &[u8]) -> Vec<StreamCandidate> {
    StreamLocator::new(data).collect()
}

/// First occurrence of `needle` at or after `from`
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Last occurrence of `needle` that ends at or before `before`
fn rfind(haystack: &[u8], needle: &[u8], before: usize) -> Option<usize> {
    haystack[..before.min(haystack.len())]
        .windows(needle.len())
        .rposition(|w| w == needle)
}

/// Offset after one optional end-of-line marker starting at `pos`
fn skip_eol(data: &[u8], pos: usize) -> usize {
    let rest = &data[pos.min(data.len())..];
    if rest.starts_with(b"\r\n") {
        pos + 2
    } else if rest.starts_with(b"\n") || rest.starts_with(b"\r") {
        pos + 1
    } else {
        pos
    }
}

/// Offset before one optional end-of-line marker ending at `pos`
fn trim_eol(data: &[u8], pos: usize) -> usize {
    let head = &data[..pos];
    if head.ends_with(b"\r\n") {
        pos - 2
    } else if head.ends_with(b"\n") || head.ends_with(b"\r") {
        pos - 1
    } else {
        pos
    }
}
