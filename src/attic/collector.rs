//! Collects retirement candidates from an aptly dev repository
//!
//! aptly cannot report where a package lives on disk, so the pool directory
//! of the published repository is walked once and package keys are matched
//! against `.deb` file names.

use super::{AtticOptions, distro_base};
use crate::core::error::UploadError;
use crate::exec::{CommandRunner, CommandSpec};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::WalkDir;

/// One package of the dev repository with its pool file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Package name, the key up to the first `_`
    pub name: String,
    /// aptly package key, `name_version_arch`
    pub key: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub older_than_cutoff: bool,
}

pub struct PackageCollector {
    runner: Arc<dyn CommandRunner>,
}

impl PackageCollector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// List the repository and pair each package with its pool file
    ///
    /// Packages without a pool file are logged and left out.
    pub async fn collect(
        &self,
        options: &AtticOptions,
        cutoff: SystemTime,
    ) -> Result<Vec<PackageEntry>, UploadError> {
        let keys = self.search(&options.distro).await?;
        let pool = pool_dir(&options.repo_dir, &options.distro);
        let files = index_pool(&pool);
        tracing::debug!(packages = keys.len(), files = files.len(), pool = %pool.display(), "indexed pool");

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(path) = files.get(&format!("{}.deb", key)) else {
                tracing::warn!(
                    package = %key,
                    pool = %pool.display(),
                    "skipping package, could not find its file"
                );
                continue;
            };

            let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping package, cannot stat file");
                    continue;
                }
            };

            entries.push(PackageEntry {
                name: package_name(&key).to_string(),
                key,
                path: path.clone(),
                modified,
                older_than_cutoff: modified < cutoff,
            });
        }

        Ok(entries)
    }

    /// `aptly repo search <distro>`, one package key per line
    async fn search(&self, distro: &str) -> Result<Vec<String>, UploadError> {
        let cmd = CommandSpec::new("aptly", ["repo", "search", distro]);
        let output = self
            .runner
            .capture(&cmd)
            .await
            .map_err(|e| UploadError::CommandLaunch {
                target: distro.to_string(),
                program: e.program().to_string(),
                message: e.to_string(),
            })?;

        let keys: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        // aptly exits non-zero for an empty result set
        if output.exit_code != 0 && !keys.is_empty() {
            return Err(UploadError::CommandFailed {
                target: distro.to_string(),
                command: cmd.to_string(),
                exit_code: output.exit_code,
            });
        }
        if output.exit_code != 0 {
            tracing::warn!(distro, exit_code = output.exit_code, "repository search returned nothing");
        }

        Ok(keys)
    }
}

/// `<repo_dir>/<distro base>/pool/main`
pub fn pool_dir(repo_dir: &Path, distro: &str) -> PathBuf {
    repo_dir.join(distro_base(distro)).join("pool").join("main")
}

fn package_name(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

/// File name → path of every `.deb` under `pool`
fn index_pool(pool: &Path) -> HashMap<String, PathBuf> {
    let mut files = HashMap::new();

    for entry in WalkDir::new(pool) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read pool directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(".deb") {
            files.insert(name.into_owned(), entry.into_path());
        }
    }

    files
}

/// Packages to move: per name, everything but the `keep` newest that is also
/// older than the cutoff. `keep == 0` holds nothing back.
pub fn select_candidates(entries: Vec<PackageEntry>, keep: usize) -> Vec<PackageEntry> {
    let mut by_name: BTreeMap<String, Vec<PackageEntry>> = BTreeMap::new();
    for entry in entries {
        by_name.entry(entry.name.clone()).or_default().push(entry);
    }

    let mut selected = Vec::new();
    for (_, mut versions) in by_name {
        versions.sort_by_key(|entry| entry.modified);
        let retire = versions.len().saturating_sub(keep);
        selected.extend(
            versions
                .into_iter()
                .take(retire)
                .filter(|entry| entry.older_than_cutoff),
        );
    }

    selected
}
