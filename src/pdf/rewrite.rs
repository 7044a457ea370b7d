//! Whole-file patching and atomic replacement
//!
//! All streams are planned first. A fatal size condition on any stream aborts
//! before anything is written, so the file is either fully patched or untouched.

use std::fs::{self, File, FileTimes, Metadata};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::locate::StreamLocator;
use super::patch::{patch_stream, Patch, PatchResult, SkipReason};
use crate::error::{Error, Result};

/// Options for patching text in a PDF
#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    /// PDF file to patch in place
    pub path: PathBuf,
    /// Bytes to look for in the decompressed streams
    pub old: Vec<u8>,
    /// Bytes to put in place of the first occurrence in each stream
    pub new: Vec<u8>,
    /// Plan the patch without writing the file
    pub dry_run: bool,
}

/// Ordered, non-overlapping patches for one document buffer
#[derive(Debug, Clone, Default)]
pub struct PatchPlan {
    /// Patches in discovery order
    pub patches: Vec<Patch>,
    /// Number of FlateDecode streams examined
    pub streams_scanned: usize,
}

/// What a completed replacement did
#[derive(Debug, Clone)]
pub struct ReplaceReport {
    /// Number of FlateDecode streams examined
    pub streams_scanned: usize,
    /// Byte ranges of the stream data that was rewritten
    pub patched: Vec<Range<usize>>,
    /// Whether the file on disk was replaced (false for a dry run)
    pub written: bool,
}

/// Patch the first occurrence of `old` in every FlateDecode stream of a PDF
///
/// The file keeps its exact length. It is replaced atomically and only when
/// at least one stream was patched and no stream hit a size condition.
///
/// # Errors
///
/// - [`Error::NotFound`] if no decodable stream contains `old`
/// - [`Error::SizeExceeded`] / [`Error::PaddingMismatch`] if a patched stream
///   cannot be made to fit its original size
/// - [`Error::Io`] if the file cannot be read or replaced
///
/// # Example
///
/// ```no_run
/// use pdf_stream_patch::pdf::{replace_in_pdf, ReplaceOptions};
/// use std::path::PathBuf;
///
/// let options = ReplaceOptions {
///     path: PathBuf::from("letter.pdf"),
///     old: b"Draft".to_vec(),
///     new: b"Final".to_vec(),
///     dry_run: true,
/// };
///
/// let report = replace_in_pdf(&options).expect("Failed to patch");
/// assert!(!report.written);
/// ```
pub fn replace_in_pdf(options: &ReplaceOptions) -> Result<ReplaceReport> {
    if !options.path.exists() {
        return Err(Error::FileNotFound(options.path.clone()));
    }

    let data = fs::read(&options.path)?;
    debug!(path = %options.path.display(), bytes = data.len(), "loaded document");

    let plan = plan_patches(&data, &options.old, &options.new)?;
    if plan.patches.is_empty() {
        return Err(Error::NotFound);
    }

    let patched = apply_patches(&data, &plan.patches);

    let written = if options.dry_run {
        info!(path = %options.path.display(), "dry run, file not written");
        false
    } else {
        persist_atomically(&options.path, &patched)?;
        info!(path = %options.path.display(), streams = plan.patches.len(), "file replaced");
        true
    };

    Ok(ReplaceReport {
        streams_scanned: plan.streams_scanned,
        patched: plan.patches.into_iter().map(|p| p.range).collect(),
        written,
    })
}

/// Run the patcher over every FlateDecode stream in `data`
///
/// Streams that do not decode or do not contain `old` are skipped. The first
/// stream that cannot be made to fit ends the scan with its error. An empty
/// `old` matches at offset 0, so `new` is inserted at the start of every
/// decodable stream.
pub fn plan_patches(data: &[u8], old: &[u8], new: &[u8]) -> Result<PatchPlan> {
    let mut plan = PatchPlan::default();

    for candidate in StreamLocator::new(data) {
        plan.streams_scanned += 1;

        match patch_stream(data, &candidate, old, new)? {
            PatchResult::Applied(patch) => {
                info!(
                    offset = patch.range.start,
                    len = patch.range.len(),
                    "patched stream"
                );
                plan.patches.push(patch);
            }
            PatchResult::Skipped(SkipReason::Decode(reason)) => {
                debug!(offset = candidate.data_start, %reason, "skipping undecodable stream");
            }
            PatchResult::Skipped(SkipReason::NotFound) => {
                debug!(offset = candidate.data_start, "text not in stream");
            }
            PatchResult::Skipped(fatal) => {
                warn!(
                    offset = candidate.data_start,
                    reason = ?fatal,
                    "stream cannot keep its size"
                );
                if let Some(err) = fatal.into_error(candidate.data_start) {
                    return Err(err);
                }
            }
        }
    }

    Ok(plan)
}

/// Splice length-preserving patches into a copy of `data` in one pass
///
/// Patches must be sorted by offset and must not overlap.
pub fn apply_patches(data: &[u8], patches: &[Patch]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut cursor = 0;

    for patch in patches {
        assert!(patch.range.start >= cursor, "patches must be ordered and non-overlapping");
        assert_eq!(
            patch.replacement.len(),
            patch.range.len(),
            "patch must preserve the stream length"
        );

        out.extend_from_slice(&data[cursor..patch.range.start]);
        out.extend_from_slice(&patch.replacement);
        cursor = patch.range.end;
    }
    out.extend_from_slice(&data[cursor..]);

    assert_eq!(out.len(), data.len());
    out
}

/// Replace `path` with `data` through a temp file in the same directory
///
/// Ownership (Unix, best effort), permissions and timestamps of the original
/// file are copied onto the temp file before it is renamed over the target.
/// The temp file is removed on every error path.
pub fn persist_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let metadata = fs::metadata(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    copy_metadata(&metadata, temp.as_file())?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn copy_metadata(metadata: &Metadata, file: &File) -> Result<()> {
    // Ownership first: chown can clear setuid/setgid bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::{fchown, MetadataExt};

        if let Err(e) = fchown(file, Some(metadata.uid()), Some(metadata.gid())) {
            debug!(error = %e, "could not copy file ownership");
        }
    }

    file.set_permissions(metadata.permissions())?;

    let times = FileTimes::new()
        .set_accessed(metadata.accessed()?)
        .set_modified(metadata.modified()?);
    file.set_times(times)?;

    Ok(())
}
