pub mod attic;
pub mod core;
pub mod exec;
pub mod orchestration;
pub mod remote;
pub mod suites;

pub use crate::core::*;
pub use orchestration::{BatchUploadOptions, BatchUploadResult, BatchUploader, TargetReport, TargetUploader};
pub use suites::{SuiteContext, TargetRegistry};
