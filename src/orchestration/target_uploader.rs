//! Target Uploader - one incremental, idempotent run for a single target
//!
//! A run reads the target's progress marker, uploads every artifact built
//! since the last success, finalizes, and only then advances the marker to
//! the instant the run began.

use crate::core::error::UploadError;
use crate::core::marker::ProgressMarker;
use crate::core::state_machine::{RunState, RunStateMachine, StateTransition};
use crate::suites::{SuiteContext, TargetRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::Instrument;

/// Report of one target run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub state: RunState,
    pub uploaded: Vec<PathBuf>,
    /// Already present in the repository
    pub skipped: Vec<PathBuf>,
    /// Previous marker value; `None` when there was no prior run
    pub since: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finalized: bool,
    pub marker_advanced: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<StateTransition>,
}

impl TargetReport {
    /// Report for a target that failed or never ran
    pub fn unsuccessful(target: &str, state: RunState, error: Option<String>) -> Self {
        Self {
            target: target.to_string(),
            state,
            uploaded: Vec::new(),
            skipped: Vec::new(),
            since: None,
            started_at: Utc::now(),
            finalized: false,
            marker_advanced: false,
            duration_ms: 0,
            error,
            transitions: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.state == RunState::Advanced
    }
}

/// Runs targets from a registry against one workspace
pub struct TargetUploader {
    registry: TargetRegistry,
    context: SuiteContext,
}

impl TargetUploader {
    pub fn new(registry: TargetRegistry, context: SuiteContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Upload everything new for `name` and advance its marker
    ///
    /// On error the marker is left untouched, so the same artifacts are
    /// candidates again next time.
    pub async fn upload_target(&self, name: &str) -> Result<TargetReport, UploadError> {
        let marker = ProgressMarker::for_target(&self.context.workspace, name);
        let span = tracing::info_span!("suite", target_name = %name);
        self.run(name, marker).instrument(span).await
    }

    async fn run(&self, name: &str, marker: ProgressMarker) -> Result<TargetReport, UploadError> {
        let clock = Instant::now();
        let def = self.registry.resolve(name)?;
        let suite = self.registry.build_suite(def, &self.context)?;

        let since = marker.last_success();
        match since {
            Some(since) => tracing::info!(since = %DateTime::<Utc>::from(since), "last successful upload"),
            None => tracing::info!("no previous upload recorded"),
        }

        let mut states = RunStateMachine::new(name);
        let report = match suite.run_tracked(since, &mut states).await {
            Ok(report) => report,
            Err(e) => {
                tracing::debug!(history = %states.get_history(), "run failed");
                return Err(e);
            }
        };

        let marker_advanced = marker.advance();
        states.transition(RunState::Advanced);

        let uploaded: Vec<PathBuf> = report.uploaded().iter().map(|p| p.to_path_buf()).collect();
        let skipped: Vec<PathBuf> = report.skipped().iter().map(|p| p.to_path_buf()).collect();
        tracing::info!(
            uploaded = uploaded.len(),
            skipped = skipped.len(),
            finalized = report.finalized,
            "target done"
        );

        Ok(TargetReport {
            target: name.to_string(),
            state: states.get_state(),
            uploaded,
            skipped,
            since: since.map(DateTime::<Utc>::from),
            started_at: DateTime::<Utc>::from(marker.start_time()),
            finalized: report.finalized,
            marker_advanced,
            duration_ms: clock.elapsed().as_millis() as u64,
            error: None,
            transitions: states.transitions().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::UploadConfig;
    use crate::exec::testing::ScriptedRunner;
    use std::fs::{self, File, FileTimes};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path, modified: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        file.set_times(FileTimes::new().set_modified(modified)).unwrap();
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    fn same_second(a: SystemTime, b: SystemTime) -> bool {
        let diff = a.duration_since(b).or_else(|_| b.duration_since(a)).unwrap();
        diff < Duration::from_secs(1)
    }

    fn uploader(workspace: &Path, runner: Arc<ScriptedRunner>) -> TargetUploader {
        let config = UploadConfig::new(workspace);
        TargetUploader::new(
            TargetRegistry::builtin(),
            SuiteContext::from_config(&config, runner),
        )
    }

    #[tokio::test]
    async fn test_first_run_uploads_and_sets_marker_to_start() {
        let temp_dir = TempDir::new().unwrap();
        let gem = temp_dir.path().join("sdk/ruby/arvados-2.7.0.gem");
        touch(&gem, SystemTime::now() - Duration::from_secs(10));
        let runner = Arc::new(ScriptedRunner::new());

        let report = uploader(temp_dir.path(), runner.clone())
            .upload_target("gems")
            .await
            .unwrap();

        assert!(report.success());
        assert!(report.since.is_none());
        assert_eq!(report.uploaded, vec![gem]);
        assert!(report.marker_advanced);

        let marker = ProgressMarker::path_for(temp_dir.path(), "gems");
        assert!(same_second(mtime(&marker), SystemTime::from(report.started_at)));
        assert_eq!(runner.calls_to("gem").len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_uploads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        touch(
            &temp_dir.path().join("sdk/cli/arvados-cli-2.7.0.gem"),
            SystemTime::now() - Duration::from_secs(10),
        );
        let runner = Arc::new(ScriptedRunner::new());
        let uploader = uploader(temp_dir.path(), runner.clone());

        uploader.upload_target("gems").await.unwrap();
        let second = uploader.upload_target("gems").await.unwrap();

        assert!(second.success());
        assert!(second.uploaded.is_empty());
        assert!(!second.finalized);
        assert_eq!(runner.calls_to("gem").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_leaves_marker_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let marker_path = ProgressMarker::path_for(temp_dir.path(), "gems");
        let previous = SystemTime::now() - Duration::from_secs(3600);
        touch(&marker_path, previous);
        touch(&temp_dir.path().join("sdk/ruby/arvados-2.7.1.gem"), SystemTime::now());
        let runner = Arc::new(ScriptedRunner::new().respond("gem", 1, &["Access Denied."]));

        let result = uploader(temp_dir.path(), runner).upload_target("gems").await;

        assert!(matches!(
            result,
            Err(UploadError::UploadFailed { exit_code: 1, .. })
        ));
        assert!(same_second(mtime(&marker_path), previous));
    }

    #[tokio::test]
    async fn test_repush_counts_as_success() {
        let temp_dir = TempDir::new().unwrap();
        let gem = temp_dir.path().join("sdk/ruby/arvados-2.7.0.gem");
        touch(&gem, SystemTime::now() - Duration::from_secs(10));
        let runner = Arc::new(ScriptedRunner::new().respond(
            "gem",
            1,
            &["Repushing of gem versions is not allowed."],
        ));

        let report = uploader(temp_dir.path(), runner).upload_target("gems").await.unwrap();

        assert!(report.success());
        assert_eq!(report.skipped, vec![gem]);
        assert!(ProgressMarker::path_for(temp_dir.path(), "gems").exists());
    }

    #[tokio::test]
    async fn test_only_files_since_marker_are_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        touch(&ProgressMarker::path_for(temp_dir.path(), "python"), now - Duration::from_secs(60));
        touch(&temp_dir.path().join("sdk/python/dist/old-1.0.tar.gz"), now - Duration::from_secs(120));
        let fresh = temp_dir.path().join("sdk/python/dist/new-1.1-py3-none-any.whl");
        touch(&fresh, now - Duration::from_secs(30));
        let runner = Arc::new(ScriptedRunner::new());

        let report = uploader(temp_dir.path(), runner.clone())
            .upload_target("python")
            .await
            .unwrap();

        assert_eq!(report.uploaded, vec![fresh]);
        assert!(report.since.is_some());
        assert_eq!(runner.calls_to("twine").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_run_still_advances_marker() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let report = uploader(temp_dir.path(), runner.clone())
            .upload_target("python")
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Advanced);
        assert!(ProgressMarker::path_for(temp_dir.path(), "python").exists());
        assert!(runner.calls().is_empty());
        assert_eq!(report.transitions.len(), 2);
    }
}
