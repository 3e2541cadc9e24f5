//! Distro Suite - stages .deb/.rpm files on the repository host and publishes them

use crate::core::error::UploadError;
use crate::core::traits::{
    ArtifactResult, ArtifactSuite, CandidateArtifact, Transport, UploadOutcome,
};
use crate::remote::{RemotePublisher, RemoteScript};
use async_trait::async_trait;
use std::path::PathBuf;

/// Which repository format the host publishes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistroFlavor {
    /// aptly repository, e.g. `bookworm-dev`
    Debian { distname: String },
    /// createrepo directory, e.g. `/var/www/rpm.arvados.org/RHEL/8/dev/x86_64/`
    RedHat { repo_dir: String },
}

impl DistroFlavor {
    fn script_name(&self) -> &'static str {
        match self {
            DistroFlavor::Debian { .. } => "debian-suite",
            DistroFlavor::RedHat { .. } => "redhat-suite",
        }
    }

    fn publish_script(&self, dest_dir: &str, basenames: &[String]) -> RemoteScript {
        match self {
            DistroFlavor::Debian { distname } => {
                RemoteScript::apt_publish(self.script_name(), dest_dir, distname, basenames)
            }
            DistroFlavor::RedHat { repo_dir } => {
                RemoteScript::createrepo(self.script_name(), dest_dir, repo_dir, basenames)
            }
        }
    }
}

/// Distribution repository suite
///
/// Uploading copies every candidate to `dest_dir` in one transfer; finalize
/// runs the flavor's publish script over all of them.
pub struct DistroSuite {
    name: String,
    patterns: Vec<String>,
    flavor: DistroFlavor,
    dest_dir: String,
    publisher: RemotePublisher,
}

impl DistroSuite {
    pub fn new(
        name: &str,
        patterns: Vec<String>,
        flavor: DistroFlavor,
        dest_dir: String,
        publisher: RemotePublisher,
    ) -> Self {
        Self {
            name: name.to_string(),
            patterns,
            flavor,
            dest_dir,
            publisher,
        }
    }

    pub fn flavor(&self) -> &DistroFlavor {
        &self.flavor
    }

    pub fn dest_dir(&self) -> &str {
        &self.dest_dir
    }
}

#[async_trait]
impl ArtifactSuite for DistroSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn transport(&self) -> Transport {
        Transport::Remote
    }

    async fn upload_one(&self, artifact: &CandidateArtifact) -> Result<UploadOutcome, UploadError> {
        self.publisher
            .stage(std::slice::from_ref(&artifact.path), &self.dest_dir)
            .await?;
        Ok(UploadOutcome::Uploaded)
    }

    async fn upload_all(
        &self,
        artifacts: &[CandidateArtifact],
    ) -> Result<Vec<ArtifactResult>, UploadError> {
        let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        self.publisher.stage(&paths, &self.dest_dir).await?;

        Ok(paths
            .into_iter()
            .map(|path| ArtifactResult {
                path,
                outcome: UploadOutcome::Uploaded,
            })
            .collect())
    }

    async fn finalize(&self, artifacts: &[CandidateArtifact]) -> Result<(), UploadError> {
        let basenames: Vec<String> = artifacts.iter().map(|a| a.basename()).collect();
        let script = self.flavor.publish_script(&self.dest_dir, &basenames);
        self.publisher.execute(&script).await
    }
}
