//! Configuration structures for package-uploader
//!
//! [`UploadConfig`] carries the validated command-line inputs; [`TargetsFile`]
//! is the optional YAML document that reshapes the target registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Default staging directory on the remote host, relative to the login directory
pub const DEFAULT_REMOTE_DEST_DIR: &str = "tmp";

/// Default root of the served RPM repositories on the remote host
pub const DEFAULT_RPM_REPO_ROOT: &str = "/var/www/rpm.arvados.org/";

/// Repository channel distro packages are published to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoChannel {
    /// Nightly development builds
    #[default]
    Dev,
    /// Release candidates
    Testing,
}

impl RepoChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoChannel::Dev => "dev",
            RepoChannel::Testing => "testing",
        }
    }
}

impl fmt::Display for RepoChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated inputs of an upload run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Source tree holding the built packages
    pub workspace: PathBuf,

    /// Requested target names; `all` expands to every registered target
    pub targets: Vec<String>,

    /// Host specification of the distribution repository server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,

    /// Options passed to ssh/scp as `-o<option>`
    #[serde(default)]
    pub ssh_opts: Vec<String>,

    /// 0 = warnings only, 1 = info, 2+ = debug
    #[serde(default)]
    pub verbosity: u8,

    #[serde(default)]
    pub repo: RepoChannel,

    /// Keep going with the next target after one fails
    #[serde(default)]
    pub continue_on_error: bool,
}

impl UploadConfig {
    pub fn new<P: Into<PathBuf>>(workspace: P) -> Self {
        Self {
            workspace: workspace.into(),
            targets: vec!["all".to_string()],
            ssh_host: None,
            ssh_opts: Vec::new(),
            verbosity: 0,
            repo: RepoChannel::default(),
            continue_on_error: false,
        }
    }

    /// Whether informational output (and remote tool chatter) is wanted
    pub fn is_verbose(&self) -> bool {
        self.verbosity > 0
    }
}

/// Kind of upload suite a target uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteKind {
    Python,
    Gem,
    Debian,
    Redhat,
}

/// Remote host settings shared by distro targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Staging directory on the remote host
    #[serde(default = "default_dest_dir")]
    pub dest_dir: String,

    /// Root under which `RHEL/<release>/<channel>/x86_64/` lives
    #[serde(default = "default_rpm_repo_root")]
    pub rpm_repo_root: String,
}

fn default_dest_dir() -> String {
    DEFAULT_REMOTE_DEST_DIR.to_string()
}

fn default_rpm_repo_root() -> String {
    DEFAULT_RPM_REPO_ROOT.to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            dest_dir: default_dest_dir(),
            rpm_repo_root: default_rpm_repo_root(),
        }
    }
}

/// One target entry of the targets file
///
/// An entry naming an existing target replaces it; `enabled: false` removes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SuiteKind>,

    /// Globs relative to the workspace; distro kinds default to `packages/<name>/*.<ext>`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,

    /// Debian/Ubuntu release codename (debian kind)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codename: Option<String>,

    /// RHEL major release (redhat kind)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl TargetSpec {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Root of the YAML targets file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetsFile {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_config_defaults() {
        let config = UploadConfig::new("/build/arvados");

        assert_eq!(config.targets, vec!["all".to_string()]);
        assert_eq!(config.repo, RepoChannel::Dev);
        assert!(config.ssh_host.is_none());
        assert!(!config.is_verbose());
    }

    #[test]
    fn test_repo_channel_serialization() {
        assert_eq!(serde_json::to_string(&RepoChannel::Testing).unwrap(), r#""testing""#);
        assert_eq!(RepoChannel::Dev.to_string(), "dev");
    }

    #[test]
    fn test_targets_file_defaults() {
        let file: TargetsFile = serde_yaml::from_str("targets: {}").unwrap();

        assert_eq!(file.remote, RemoteSettings::default());
        assert!(file.targets.is_empty());
    }

    #[test]
    fn test_target_spec_parsing() {
        let yaml = r#"
remote:
  dest_dir: staging
targets:
  debian13:
    kind: debian
    codename: trixie
  centos7:
    enabled: false
"#;
        let file: TargetsFile = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(file.remote.dest_dir, "staging");
        assert_eq!(file.remote.rpm_repo_root, DEFAULT_RPM_REPO_ROOT);

        let trixie = &file.targets["debian13"];
        assert_eq!(trixie.kind, Some(SuiteKind::Debian));
        assert_eq!(trixie.codename.as_deref(), Some("trixie"));
        assert!(trixie.is_enabled());

        assert!(!file.targets["centos7"].is_enabled());
    }
}
