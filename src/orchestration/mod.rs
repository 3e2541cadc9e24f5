//! Orchestration layer for package uploads
//!
//! Runs one target at a time through its suite and progress marker, and
//! sequences several targets into a batch.

pub mod batch_uploader;
pub mod target_uploader;

pub use batch_uploader::{BatchUploadOptions, BatchUploadResult, BatchUploader};
pub use target_uploader::{TargetReport, TargetUploader};
