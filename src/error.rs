//! Error types for the PDF stream patch library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF stream patch library
#[derive(Error, Debug)]
pub enum Error {
    /// No decodable FlateDecode stream contained the target text
    #[error("String not found")]
    NotFound,

    /// The recompressed stream is larger than the original
    #[error(
        "Replacement would change stream size: stream at offset {offset} is {original_len} bytes, \
         recompressed form needs {replacement_len}"
    )]
    SizeExceeded {
        offset: usize,
        original_len: usize,
        replacement_len: usize,
    },

    /// The leftover space cannot be filled with whole empty stored blocks
    #[error(
        "Replacement would change stream size: {shortfall} spare bytes in stream at offset {offset} \
         are not a multiple of 5"
    )]
    PaddingMismatch { offset: usize, shortfall: usize },

    /// Stream data is not valid zlib/deflate
    #[error("Decode error: {0}")]
    Decode(String),

    /// The deflate encoder failed while recompressing a stream
    #[error("Encode error: {0}")]
    Encode(String),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process status code for this error
    ///
    /// `1` when the text was not found (or the run failed for another reason),
    /// `2` when a stream could not be made to fit its original size.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SizeExceeded { .. } | Error::PaddingMismatch { .. } => 2,
            _ => 1,
        }
    }

    /// Whether this error aborts a whole-file operation when hit on one stream
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SizeExceeded { .. } | Error::PaddingMismatch { .. })
    }
}
