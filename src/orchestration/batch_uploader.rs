//! Batch Uploader - runs several targets in one invocation
//!
//! Features:
//! - `all` expansion and whole-request validation before any side effect
//! - Sequential runs, one target at a time
//! - Stop on first failure, or keep going with `continue_on_error`
//! - Per-target reports, serializable as JSON

use crate::core::config::UploadConfig;
use crate::core::error::UploadError;
use crate::core::state_machine::RunState;
use crate::orchestration::target_uploader::{TargetReport, TargetUploader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Batch upload options
#[derive(Debug, Clone, Default)]
pub struct BatchUploadOptions {
    /// Continue on error (default: stop on first error)
    pub continue_on_error: bool,

    /// Whether a remote host was configured for distro targets
    pub has_remote_host: bool,
}

impl From<&UploadConfig> for BatchUploadOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            continue_on_error: config.continue_on_error,
            has_remote_host: config.ssh_host.is_some(),
        }
    }
}

/// Batch upload result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUploadResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Targets whose run finished and advanced its marker
    pub succeeded: Vec<String>,

    /// Failed targets with error messages
    pub failed: BTreeMap<String, String>,

    /// Targets not attempted because an earlier one failed
    pub skipped: Vec<String>,

    /// Overall success status
    pub success: bool,

    /// Process exit code for this batch: 0, or the first failure's code
    pub exit_code: i32,

    /// Reports in run order
    pub reports: Vec<TargetReport>,
}

impl BatchUploadResult {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            succeeded: Vec::new(),
            failed: BTreeMap::new(),
            skipped: Vec::new(),
            success: false,
            exit_code: 0,
            reports: Vec::new(),
        }
    }

    /// One line per target for terminal output
    pub fn summary_lines(&self) -> Vec<String> {
        self.reports
            .iter()
            .map(|report| match report.state {
                RunState::Advanced if report.uploaded.is_empty() && report.skipped.is_empty() => {
                    format!("{}: nothing new", report.target)
                }
                RunState::Advanced => format!(
                    "{}: {} uploaded, {} already present",
                    report.target,
                    report.uploaded.len(),
                    report.skipped.len()
                ),
                RunState::Idle => format!("{}: skipped after earlier failure", report.target),
                _ => format!(
                    "{}: failed: {}",
                    report.target,
                    report.error.as_deref().unwrap_or("unknown error")
                ),
            })
            .collect()
    }
}

/// BatchUploader - runs a list of targets through one [`TargetUploader`]
pub struct BatchUploader {
    uploader: TargetUploader,
}

impl BatchUploader {
    pub fn new(uploader: TargetUploader) -> Self {
        Self { uploader }
    }

    /// Upload to every target in `names`
    ///
    /// Configuration problems anywhere in the request are returned as `Err`
    /// before any target runs. Failures during the runs are recorded in the
    /// result instead.
    pub async fn upload_targets(
        &self,
        names: &[String],
        options: &BatchUploadOptions,
    ) -> Result<BatchUploadResult, UploadError> {
        let names = self
            .uploader
            .registry()
            .validate_targets(names, options.has_remote_host)?;

        tracing::info!(
            count = names.len(),
            targets = %names.join(", "),
            continue_on_error = options.continue_on_error,
            "starting batch upload"
        );

        let mut result = BatchUploadResult::new();

        for name in names {
            if !result.failed.is_empty() && !options.continue_on_error {
                tracing::warn!(target_name = %name, "skipping due to previous failure");
                result.reports.push(TargetReport::unsuccessful(&name, RunState::Idle, None));
                result.skipped.push(name);
                continue;
            }

            match self.uploader.upload_target(&name).await {
                Ok(report) => {
                    result.succeeded.push(name);
                    result.reports.push(report);
                }
                Err(e) => {
                    tracing::error!(target_name = %name, error = %e, "target failed");
                    for action in e.suggested_actions() {
                        tracing::info!(target_name = %name, "{}", action);
                    }
                    if result.exit_code == 0 {
                        result.exit_code = e.exit_code();
                    }
                    let message = e.to_string();
                    result.reports.push(TargetReport::unsuccessful(
                        &name,
                        RunState::Failed,
                        Some(message.clone()),
                    ));
                    result.failed.insert(name, message);
                }
            }
        }

        result.success = result.failed.is_empty() && result.skipped.is_empty();
        Ok(result)
    }
}
