//! Core traits and types for artifact uploads
//!
//! This module defines the [`ArtifactSuite`] abstraction shared by every
//! ecosystem: candidate enumeration, sequential fail-fast upload, and an
//! optional finalize step.

use crate::core::error::UploadError;
use crate::core::state_machine::{RunState, RunStateMachine};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// ============================================================================
// Transport
// ============================================================================

/// How a target reaches its repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// The package client runs locally against a public index
    Local,
    /// Files are staged on, and published by, a remote repository host
    Remote,
}

// ============================================================================
// Candidates and outcomes
// ============================================================================

/// A locally built file eligible for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateArtifact {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl CandidateArtifact {
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of uploading one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded,
    /// The repository already has this artifact; counts as success
    Skipped { detail: String },
    Failed { exit_code: i32, detail: String },
}

impl UploadOutcome {
    /// Classify a finished upload command
    ///
    /// A recognized "already exists" line wins over the exit code; otherwise
    /// exit 0 is an upload and anything else a failure.
    pub fn classify(exit_code: i32, matched_lines: &[String], command: &str) -> Self {
        if let Some(line) = matched_lines.first() {
            return UploadOutcome::Skipped {
                detail: line.clone(),
            };
        }

        if exit_code == 0 {
            UploadOutcome::Uploaded
        } else {
            UploadOutcome::Failed {
                exit_code,
                detail: format!("`{}` exited with status {}", command, exit_code),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, UploadOutcome::Failed { .. })
    }
}

/// One artifact and what happened to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// Result of one suite run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub results: Vec<ArtifactResult>,
    /// Whether the finalize step ran
    pub finalized: bool,
}

impl SuiteReport {
    /// Whether any candidate was handed to the upload step
    pub fn uploaded_any(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn uploaded(&self) -> Vec<&Path> {
        self.paths_where(|o| matches!(o, UploadOutcome::Uploaded))
    }

    pub fn skipped(&self) -> Vec<&Path> {
        self.paths_where(|o| matches!(o, UploadOutcome::Skipped { .. }))
    }

    fn paths_where(&self, pred: impl Fn(&UploadOutcome) -> bool) -> Vec<&Path> {
        self.results
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.path.as_path())
            .collect()
    }
}

// ============================================================================
// Candidate enumeration
// ============================================================================

/// Expand `patterns` and keep regular files modified at or after `since`
///
/// Order is pattern order, then the order `glob` yields matches in. `None`
/// for `since` means there was no prior run, so every file qualifies.
pub fn enumerate_globs(
    target: &str,
    patterns: &[String],
    since: Option<SystemTime>,
) -> Result<Vec<CandidateArtifact>, UploadError> {
    let mut candidates = Vec::new();

    for pattern in patterns {
        let paths = glob::glob(pattern).map_err(|e| UploadError::InvalidGlob {
            target: target.to_string(),
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(target_name = target, error = %e, "skipping unreadable path");
                    continue;
                }
            };

            let io_error = |e: std::io::Error| UploadError::Io {
                target: target.to_string(),
                path: path.display().to_string(),
                message: e.to_string(),
            };
            let metadata = std::fs::metadata(&path).map_err(io_error)?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().map_err(io_error)?;
            if since.is_none_or(|since| modified >= since) {
                candidates.push(CandidateArtifact { path, modified });
            }
        }
    }

    Ok(candidates)
}

// ============================================================================
// Artifact Suite Trait
// ============================================================================

/// Upload strategy for one target
///
/// Implementations supply `upload_one`; enumeration, sequencing and the run
/// composition are shared. Suites are built by the target registry, which
/// injects the command runner they use.
#[async_trait]
pub trait ArtifactSuite: Send + Sync {
    /// Target name (e.g., "python", "debian12")
    fn name(&self) -> &str;

    /// Absolute glob patterns this suite uploads from
    fn patterns(&self) -> &[String];

    fn transport(&self) -> Transport {
        Transport::Local
    }

    /// List files matching the suite's patterns modified at or after `since`
    fn enumerate_candidates(
        &self,
        since: Option<SystemTime>,
    ) -> Result<Vec<CandidateArtifact>, UploadError> {
        enumerate_globs(self.name(), self.patterns(), since)
    }

    /// Upload a single artifact
    ///
    /// Only a failure to run the client at all is an `Err`; a client that ran
    /// and failed is reported as [`UploadOutcome::Failed`].
    async fn upload_one(&self, artifact: &CandidateArtifact) -> Result<UploadOutcome, UploadError>;

    /// Upload `artifacts` in order, stopping at the first failure
    async fn upload_all(
        &self,
        artifacts: &[CandidateArtifact],
    ) -> Result<Vec<ArtifactResult>, UploadError> {
        let mut results = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            tracing::info!(path = %artifact.path.display(), "uploading");
            let outcome = self.upload_one(artifact).await?;

            match &outcome {
                UploadOutcome::Failed { exit_code, detail } => {
                    tracing::error!(path = %artifact.path.display(), %detail, "upload failed");
                    return Err(UploadError::UploadFailed {
                        target: self.name().to_string(),
                        path: artifact.path.display().to_string(),
                        exit_code: *exit_code,
                    });
                }
                UploadOutcome::Skipped { detail } => {
                    tracing::info!(path = %artifact.path.display(), %detail, "already present, skipped");
                }
                UploadOutcome::Uploaded => {}
            }

            results.push(ArtifactResult {
                path: artifact.path.clone(),
                outcome,
            });
        }

        Ok(results)
    }

    /// Publish step after all uploads succeeded; no-op by default
    async fn finalize(&self, _artifacts: &[CandidateArtifact]) -> Result<(), UploadError> {
        Ok(())
    }

    /// Enumerate, upload and finalize, reporting progress to `states`
    ///
    /// The machine must be `Idle`. On error it is left in `Failed`.
    async fn run_tracked(
        &self,
        since: Option<SystemTime>,
        states: &mut RunStateMachine,
    ) -> Result<SuiteReport, UploadError> {
        states.transition(RunState::Enumerating);
        let candidates = match self.enumerate_candidates(since) {
            Ok(candidates) => candidates,
            Err(e) => {
                states.fail(&e.to_string());
                return Err(e);
            }
        };

        if candidates.is_empty() {
            tracing::info!("no new artifacts");
            return Ok(SuiteReport::default());
        }
        tracing::info!(count = candidates.len(), "found new artifacts");

        states.transition(RunState::Uploading);
        let results = match self.upload_all(&candidates).await {
            Ok(results) => results,
            Err(e) => {
                states.fail(&e.to_string());
                return Err(e);
            }
        };

        states.transition(RunState::Finalizing);
        if let Err(e) = self.finalize(&candidates).await {
            states.fail(&e.to_string());
            return Err(e);
        }

        Ok(SuiteReport {
            results,
            finalized: true,
        })
    }

    /// Enumerate, upload and finalize without external state tracking
    async fn run(&self, since: Option<SystemTime>) -> Result<SuiteReport, UploadError> {
        let mut states = RunStateMachine::new(self.name());
        self.run_tracked(since, &mut states).await
    }
}
