//! PDF stream patching module

pub mod codec;
pub mod locate;
pub mod patch;
pub mod rewrite;

// Re-export commonly used items
pub use locate::{find_streams, StreamCandidate, StreamLocator};
pub use patch::{patch_stream, Patch, PatchResult, SkipReason};
pub use rewrite::{
    apply_patches, persist_atomically, plan_patches, replace_in_pdf, PatchPlan, ReplaceOptions,
    ReplaceReport,
};
