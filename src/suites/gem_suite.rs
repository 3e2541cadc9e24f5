//! Gem Suite - pushes gems to rubygems.org

use super::launch_error;
use crate::core::error::UploadError;
use crate::core::traits::{ArtifactSuite, CandidateArtifact, UploadOutcome};
use crate::exec::{CommandRunner, CommandSpec, OutputStream};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref REUPLOAD: Vec<Regex> = vec![
        Regex::new(r"^Repushing of gem versions is not allowed\.$").expect("static gem pattern"),
    ];
}

/// RubyGems suite
pub struct GemSuite {
    name: String,
    patterns: Vec<String>,
    runner: Arc<dyn CommandRunner>,
}

impl GemSuite {
    pub fn new(name: &str, patterns: Vec<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name: name.to_string(),
            patterns,
            runner,
        }
    }
}

#[async_trait]
impl ArtifactSuite for GemSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn patterns(&self) -> &[String] {
        &self.patterns
    }

    async fn upload_one(&self, artifact: &CandidateArtifact) -> Result<UploadOutcome, UploadError> {
        let cmd = CommandSpec::new("gem", ["push".to_string(), artifact.path.display().to_string()]);
        let output = self
            .runner
            .run_and_grep(&cmd, OutputStream::Stdout, &REUPLOAD)
            .await
            .map_err(|e| launch_error(&self.name, e))?;

        Ok(UploadOutcome::classify(
            output.exit_code,
            &output.matched_lines,
            &cmd.to_string(),
        ))
    }
}
