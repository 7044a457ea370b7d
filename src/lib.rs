//! PDF Stream Patch Library
//!
//! Replaces text inside the FlateDecode content streams of a PDF without
//! changing the length of the file. Every byte outside the patched streams
//! keeps its offset, so cross-reference tables, `/Length` entries and
//! signatures over fixed ranges stay valid.
//!
//! This library provides functionality to:
//! - Locate FlateDecode streams by scanning the raw bytes
//! - Decompress, substitute and recompress one stream at a time
//! - Pad the recompressed stream with empty stored blocks to its original size
//! - Replace the file atomically, keeping its permissions
//!
//! # Example
//!
//! ```no_run
//! use pdf_stream_patch::pdf::{replace_in_pdf, ReplaceOptions};
//! use std::path::PathBuf;
//!
//! let options = ReplaceOptions {
//!     path: PathBuf::from("invoice.pdf"),
//!     old: b"2023".to_vec(),
//!     new: b"2024".to_vec(),
//!     dry_run: false,
//! };
//!
//! let report = replace_in_pdf(&options).expect("Failed to patch PDF");
//! println!("Patched {} streams", report.patched.len());
//! ```

pub mod error;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result};
