//! Python Suite - uploads sdists and wheels with twine

use super::launch_error;
use crate::core::error::UploadError;
use crate::core::traits::{ArtifactSuite, CandidateArtifact, UploadOutcome};
use crate::exec::{CommandRunner, CommandSpec, OutputStream};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    /// twine's ways of saying the index already has this file
    static ref ALREADY_EXISTS: Vec<Regex> = [
        r"File already exists",
        r"already exists",
        r"Skipping .* because it appears to already exist",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static twine pattern"))
    .collect();
}

/// Python package index suite
pub struct PythonSuite {
    name: String,
    patterns: Vec<String>,
    runner: Arc<dyn CommandRunner>,
}

impl PythonSuite {
    pub fn new(name: &str, patterns: Vec<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name: name.to_string(),
            patterns,
            runner,
        }
    }

    fn upload_cmd(artifact: &CandidateArtifact) -> CommandSpec {
        CommandSpec::new(
            "twine",
            [
                "upload".to_string(),
                "--disable-progress-bar".to_string(),
                "--non-interactive".to_string(),
                "--skip-existing".to_string(),
                artifact.path.display().to_string(),
            ],
        )
        .with_null_stdin()
    }
}

#[async_trait]
impl ArtifactSuite for PythonSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn patterns(&self) -> &[String] {
        &self.patterns
    }

    async fn upload_one(&self, artifact: &CandidateArtifact) -> Result<UploadOutcome, UploadError> {
        let cmd = Self::upload_cmd(artifact);
        let output = self
            .runner
            .run_and_grep(&cmd, OutputStream::Stderr, &ALREADY_EXISTS)
            .await
            .map_err(|e| launch_error(&self.name, e))?;

        Ok(UploadOutcome::classify(
            output.exit_code,
            &output.matched_lines,
            &cmd.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn artifact(path: &str) -> CandidateArtifact {
        CandidateArtifact {
            path: PathBuf::from(path),
            modified: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_upload_invokes_twine_non_interactively() {
        let runner = Arc::new(ScriptedRunner::new());
        let suite = PythonSuite::new("python", vec![], runner.clone());

        let outcome = suite
            .upload_one(&artifact("/ws/sdk/python/dist/arvados_python_client-2.7.0-py3-none-any.whl"))
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::Uploaded);
        let calls = runner.calls_to("twine");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].null_stdin);
        assert_eq!(
            calls[0].args,
            vec![
                "upload",
                "--disable-progress-bar",
                "--non-interactive",
                "--skip-existing",
                "/ws/sdk/python/dist/arvados_python_client-2.7.0-py3-none-any.whl"
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped_even_on_error_exit() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "twine",
            1,
            &["HTTPError: 400 Bad Request", "File already exists. See https://pypi.org/help/#file-name-reuse"],
        ));
        let suite = PythonSuite::new("python", vec![], runner);

        let outcome = suite.upload_one(&artifact("/ws/a.tar.gz")).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_skip_existing_notice_is_skipped() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "twine",
            0,
            &["WARNING  Skipping a.whl because it appears to already exist"],
        ));
        let suite = PythonSuite::new("python", vec![], runner);

        let outcome = suite.upload_one(&artifact("/ws/a.whl")).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_unrecognized_failure_is_failed() {
        let runner = Arc::new(ScriptedRunner::new().respond("twine", 1, &["HTTPError: 403 Forbidden"]));
        let suite = PythonSuite::new("python", vec![], runner);

        let outcome = suite.upload_one(&artifact("/ws/a.whl")).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Failed { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_twine_is_error() {
        let runner = Arc::new(ScriptedRunner::new().missing("twine"));
        let suite = PythonSuite::new("python", vec![], runner);

        let result = suite.upload_one(&artifact("/ws/a.whl")).await;

        assert!(matches!(result, Err(UploadError::CommandLaunch { .. })));
    }
}
