//! Target Registry - maps target names to upload suites
//!
//! The built-in table covers the package indexes and every supported
//! distribution release. A targets file can add, replace or disable entries
//! before any run starts.
//!
//! # Example
//!
//! ```no_run
//! use package_uploader::core::{ArtifactSuite, UploadConfig};
//! use package_uploader::exec::SystemRunner;
//! use package_uploader::suites::{SuiteContext, TargetRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), package_uploader::core::UploadError> {
//! let config = UploadConfig::new("/build/arvados");
//! let registry = TargetRegistry::builtin();
//! let names = registry.validate(&config)?;
//!
//! let context = SuiteContext::from_config(&config, Arc::new(SystemRunner::new()));
//! for name in names {
//!     let suite = registry.build_suite(registry.resolve(&name)?, &context)?;
//!     suite.run(None).await?;
//! }
//! # Ok(())
//! # }
//! ```

use super::distro_suite::{DistroFlavor, DistroSuite};
use super::gem_suite::GemSuite;
use super::python_suite::PythonSuite;
use crate::core::config::{RemoteSettings, RepoChannel, SuiteKind, TargetsFile, UploadConfig};
use crate::core::error::UploadError;
use crate::core::traits::{ArtifactSuite, Transport};
use crate::exec::CommandRunner;
use crate::remote::{RemoteHost, RemotePublisher};
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Target name that selects every registered target
pub const ALL_TARGETS: &str = "all";

/// Directories holding Python sdists and wheels
const PYTHON_DIST_DIRS: &[&str] = &[
    "sdk/cwl/dist",
    "sdk/python/dist",
    "services/fuse/dist",
    "tools/crunchstat-summary/dist",
    "tools/user-activity/dist",
    "tools/cluster-activity/dist",
];

const GEM_GLOBS: &[&str] = &[
    "sdk/ruby-google-api-client/*.gem",
    "sdk/ruby/*.gem",
    "sdk/cli/*.gem",
    "services/login-sync/*.gem",
];

/// Debian-family target → release codename
pub const DEBIAN_CODENAMES: &[(&str, &str)] = &[
    ("debian10", "buster"),
    ("debian11", "bullseye"),
    ("debian12", "bookworm"),
    ("ubuntu1804", "bionic"),
    ("ubuntu2004", "focal"),
    ("ubuntu2204", "jammy"),
    ("ubuntu2404", "noble"),
];

/// RedHat-family target → major release
pub const REDHAT_RELEASES: &[(&str, &str)] = &[("centos7", "7"), ("rocky8", "8")];

lazy_static! {
    static ref BUILTIN_TARGETS: BTreeMap<String, TargetDef> = {
        let mut targets = BTreeMap::new();

        let python_globs = PYTHON_DIST_DIRS
            .iter()
            .flat_map(|dir| [format!("{}/*.tar.gz", dir), format!("{}/*.whl", dir)])
            .collect();
        targets.insert("python".to_string(), TargetDef::new("python", TargetKind::Python, python_globs));

        let gem_globs = GEM_GLOBS.iter().map(|g| g.to_string()).collect();
        targets.insert("gems".to_string(), TargetDef::new("gems", TargetKind::Gem, gem_globs));

        for (name, codename) in DEBIAN_CODENAMES {
            let kind = TargetKind::Debian {
                codename: codename.to_string(),
            };
            targets.insert(name.to_string(), TargetDef::new(name, kind.clone(), kind.default_globs(name)));
        }

        for (name, release) in REDHAT_RELEASES {
            let kind = TargetKind::RedHat {
                release: release.to_string(),
            };
            targets.insert(name.to_string(), TargetDef::new(name, kind.clone(), kind.default_globs(name)));
        }

        targets
    };
}

/// Suite flavor of a target together with its lookup data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    Python,
    Gem,
    Debian { codename: String },
    RedHat { release: String },
}

impl TargetKind {
    pub fn transport(&self) -> Transport {
        match self {
            TargetKind::Python | TargetKind::Gem => Transport::Local,
            TargetKind::Debian { .. } | TargetKind::RedHat { .. } => Transport::Remote,
        }
    }

    pub fn suite_kind(&self) -> SuiteKind {
        match self {
            TargetKind::Python => SuiteKind::Python,
            TargetKind::Gem => SuiteKind::Gem,
            TargetKind::Debian { .. } => SuiteKind::Debian,
            TargetKind::RedHat { .. } => SuiteKind::Redhat,
        }
    }

    /// `packages/<name>/*.deb` or `*.rpm`; index kinds have no default
    fn default_globs(&self, name: &str) -> Vec<String> {
        match self {
            TargetKind::Debian { .. } => vec![format!("packages/{}/*.deb", name)],
            TargetKind::RedHat { .. } => vec![format!("packages/{}/*.rpm", name)],
            TargetKind::Python | TargetKind::Gem => Vec::new(),
        }
    }
}

/// One registered target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDef {
    pub name: String,
    pub kind: TargetKind,
    /// Patterns relative to the workspace
    pub globs: Vec<String>,
}

impl TargetDef {
    pub fn new(name: &str, kind: TargetKind, globs: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            globs,
        }
    }

    pub fn transport(&self) -> Transport {
        self.kind.transport()
    }

    /// Workspace-rooted patterns; the workspace itself is matched literally
    pub fn absolute_globs(&self, workspace: &Path) -> Vec<String> {
        let workspace = workspace.display().to_string();
        let root = glob::Pattern::escape(workspace.trim_end_matches('/'));
        self.globs
            .iter()
            .map(|rel| format!("{}/{}", root, rel))
            .collect()
    }
}

/// Everything a suite needs besides its target definition
#[derive(Clone)]
pub struct SuiteContext {
    pub workspace: PathBuf,
    pub repo: RepoChannel,
    /// Present only when a remote host was configured
    pub remote_host: Option<RemoteHost>,
    pub runner: Arc<dyn CommandRunner>,
}

impl SuiteContext {
    pub fn from_config(config: &UploadConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let remote_host = config
            .ssh_host
            .as_deref()
            .map(|host| RemoteHost::new(host, &config.ssh_opts, !config.is_verbose()));

        Self {
            workspace: config.workspace.clone(),
            repo: config.repo,
            remote_host,
            runner,
        }
    }
}

/// Registered targets and the remote settings distro targets share
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: BTreeMap<String, TargetDef>,
    remote: RemoteSettings,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TargetRegistry {
    /// The built-in target table
    pub fn builtin() -> Self {
        Self {
            targets: BUILTIN_TARGETS.clone(),
            remote: RemoteSettings::default(),
        }
    }

    /// Built-in table reshaped by an optional targets file
    pub fn with_overrides(file: Option<TargetsFile>) -> Result<Self, UploadError> {
        let mut registry = Self::builtin();
        let Some(file) = file else {
            return Ok(registry);
        };

        registry.remote = file.remote;

        for (name, spec) in file.targets {
            if !spec.is_enabled() {
                tracing::debug!(target_name = %name, "target disabled by targets file");
                registry.targets.remove(&name);
                continue;
            }

            let invalid = |message: &str| UploadError::InvalidConfig {
                target: name.clone(),
                message: message.to_string(),
            };

            let kind = match spec.kind {
                Some(SuiteKind::Python) => TargetKind::Python,
                Some(SuiteKind::Gem) => TargetKind::Gem,
                Some(SuiteKind::Debian) => TargetKind::Debian {
                    codename: spec.codename.clone().ok_or_else(|| invalid("codename is required"))?,
                },
                Some(SuiteKind::Redhat) => TargetKind::RedHat {
                    release: spec.release.clone().ok_or_else(|| invalid("release is required"))?,
                },
                None => return Err(invalid("kind is required")),
            };

            let globs = if spec.globs.is_empty() {
                kind.default_globs(&name)
            } else {
                spec.globs
            };
            if globs.is_empty() {
                return Err(invalid("globs are required"));
            }

            registry.targets.insert(name.clone(), TargetDef::new(&name, kind, globs));
        }

        Ok(registry)
    }

    pub fn remote_settings(&self) -> &RemoteSettings {
        &self.remote
    }

    /// Registered target names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &TargetDef> {
        self.targets.values()
    }

    pub fn resolve(&self, name: &str) -> Result<&TargetDef, UploadError> {
        self.targets
            .get(name)
            .ok_or_else(|| UploadError::UnknownTarget {
                target: name.to_string(),
            })
    }

    /// Expand `all` and drop repeated names, keeping first occurrences
    ///
    /// `all` covers the locally uploaded language package targets only;
    /// distribution targets are always named explicitly.
    pub fn expand(&self, requested: &[String]) -> Vec<String> {
        if requested.iter().any(|name| name == ALL_TARGETS) {
            return self
                .targets
                .values()
                .filter(|def| def.transport() == Transport::Local)
                .map(|def| def.name.clone())
                .collect();
        }

        let mut names: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Check a whole request before anything runs
    ///
    /// Returns the expanded target names. Every name must resolve, and a
    /// remote host is required as soon as one target publishes remotely.
    pub fn validate(&self, config: &UploadConfig) -> Result<Vec<String>, UploadError> {
        self.validate_targets(&config.targets, config.ssh_host.is_some())
    }

    pub fn validate_targets(
        &self,
        requested: &[String],
        has_remote_host: bool,
    ) -> Result<Vec<String>, UploadError> {
        let names = self.expand(requested);
        if names.is_empty() {
            return Err(UploadError::InvalidConfig {
                target: "*".to_string(),
                message: "no targets requested".to_string(),
            });
        }

        for name in &names {
            let def = self.resolve(name)?;
            if def.transport() == Transport::Remote && !has_remote_host {
                return Err(UploadError::MissingRemoteHost {
                    target: name.clone(),
                });
            }
        }

        Ok(names)
    }

    /// Build the suite for `def`
    ///
    /// Remote targets need `context.remote_host`; [`validate`](Self::validate)
    /// guarantees it for validated requests.
    pub fn build_suite(
        &self,
        def: &TargetDef,
        context: &SuiteContext,
    ) -> Result<Box<dyn ArtifactSuite>, UploadError> {
        let patterns = def.absolute_globs(&context.workspace);
        let runner = context.runner.clone();

        let flavor = match &def.kind {
            TargetKind::Python => return Ok(Box::new(PythonSuite::new(&def.name, patterns, runner))),
            TargetKind::Gem => return Ok(Box::new(GemSuite::new(&def.name, patterns, runner))),
            TargetKind::Debian { codename } => DistroFlavor::Debian {
                distname: format!("{}-{}", codename, context.repo),
            },
            TargetKind::RedHat { release } => DistroFlavor::RedHat {
                repo_dir: self.rpm_repo_dir(release, context.repo),
            },
        };

        let host = context
            .remote_host
            .clone()
            .ok_or_else(|| UploadError::MissingRemoteHost {
                target: def.name.clone(),
            })?;
        let dest_dir = format!("{}/{}", self.remote.dest_dir.trim_end_matches('/'), def.name);

        Ok(Box::new(DistroSuite::new(
            &def.name,
            patterns,
            flavor,
            dest_dir,
            RemotePublisher::new(&def.name, host, runner),
        )))
    }

    /// `<root>/RHEL/<release>/<channel>/x86_64/` on the repository host
    fn rpm_repo_dir(&self, release: &str, repo: RepoChannel) -> String {
        let root = self.remote.rpm_repo_root.trim_end_matches('/');
        format!("{}/RHEL/{}/{}/x86_64/", root, release, repo)
    }
}
