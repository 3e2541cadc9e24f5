//! Retirement of stale packages from aptly dev repositories
//!
//! Old builds in a `<codename>-dev` repository are moved to the matching
//! `<codename>-attic` repository, keeping the newest few of every package.

pub mod collector;
pub mod mover;

pub use collector::{PackageCollector, PackageEntry, select_candidates};
pub use mover::AtticMover;

use crate::core::error::UploadError;
use crate::exec::CommandRunner;
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::Instrument;

pub const DEFAULT_REPO_DIR: &str = "/var/www/aptly_public/";
pub const DEFAULT_MIN_PACKAGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtticOptions {
    /// Dev repository to clean, e.g. `bookworm-dev`
    pub distro: String,
    /// Parent directory of the published aptly repositories
    pub repo_dir: PathBuf,
    /// Newest versions of each package that always stay
    pub min_packages: usize,
    /// Packages modified before local midnight of this day may move; today when unset
    pub cutoff_date: Option<NaiveDate>,
    pub dry_run: bool,
}

impl AtticOptions {
    pub fn new(distro: &str) -> Self {
        Self {
            distro: distro.to_string(),
            repo_dir: PathBuf::from(DEFAULT_REPO_DIR),
            min_packages: DEFAULT_MIN_PACKAGES,
            cutoff_date: None,
            dry_run: false,
        }
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if !self.distro.ends_with("-dev") {
            return Err(UploadError::InvalidConfig {
                target: self.distro.clone(),
                message: "distro must be a dev repository, e.g. bookworm-dev".to_string(),
            });
        }
        Ok(())
    }

    /// Local midnight at the start of the cutoff day
    pub fn cutoff(&self) -> Result<SystemTime, UploadError> {
        let date = self.cutoff_date.unwrap_or_else(|| Local::now().date_naive());
        date.and_time(NaiveTime::MIN)
            .and_local_timezone(Local)
            .earliest()
            .map(SystemTime::from)
            .ok_or_else(|| UploadError::InvalidConfig {
                target: self.distro.clone(),
                message: format!("{} has no local midnight", date),
            })
    }
}

/// Outcome of one retirement run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireReport {
    pub distro: String,
    pub attic: String,
    pub dry_run: bool,
    /// Packages found in the repository with a pool file
    pub examined: usize,
    pub moved: Vec<String>,
    pub published: bool,
}

/// Text before the first `-`: `bookworm-dev` → `bookworm`
pub fn distro_base(distro: &str) -> &str {
    distro.split('-').next().unwrap_or(distro)
}

/// Collect, select and move stale packages, then republish
pub async fn retire(
    options: &AtticOptions,
    runner: Arc<dyn CommandRunner>,
) -> Result<RetireReport, UploadError> {
    options.validate()?;
    let cutoff = options.cutoff()?;

    let span = tracing::info_span!("attic", distro = %options.distro);
    retire_packages(options, cutoff, runner).instrument(span).await
}

async fn retire_packages(
    options: &AtticOptions,
    cutoff: SystemTime,
    runner: Arc<dyn CommandRunner>,
) -> Result<RetireReport, UploadError> {
    let entries = PackageCollector::new(runner.clone()).collect(options, cutoff).await?;
    let examined = entries.len();
    let selected = select_candidates(entries, options.min_packages);
    tracing::info!(examined, selected = selected.len(), "collected retirement candidates");

    let mover = AtticMover::new(runner, &options.distro, options.dry_run);
    let moved = mover.move_packages(&selected).await?;
    let published = mover.update_publications().await?;

    Ok(RetireReport {
        distro: options.distro.clone(),
        attic: mover.attic(),
        dry_run: options.dry_run,
        examined,
        moved,
        published,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use std::fs::{self, File, FileTimes};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_distro_must_be_dev() {
        assert!(AtticOptions::new("bookworm-dev").validate().is_ok());

        let err = AtticOptions::new("bookworm-testing").validate().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_distro_base() {
        assert_eq!(distro_base("bookworm-dev"), "bookworm");
        assert_eq!(distro_base("bookworm"), "bookworm");
    }

    #[test]
    fn test_explicit_cutoff_is_local_midnight() {
        let mut options = AtticOptions::new("bookworm-dev");
        options.cutoff_date = NaiveDate::from_ymd_opt(2024, 3, 1);

        let cutoff = chrono::DateTime::<Local>::from(options.cutoff().unwrap());

        assert_eq!(cutoff.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(cutoff.time(), NaiveTime::MIN);
    }

    #[tokio::test]
    async fn test_retire_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let pool = temp_dir.path().join("bookworm/pool/main/a/arvados-server");
        fs::create_dir_all(&pool).unwrap();
        let base = SystemTime::now() - Duration::from_secs(86_400 * 100);
        for (i, version) in ["2.7.0", "2.7.1", "2.7.2"].iter().enumerate() {
            let file = File::create(pool.join(format!("arvados-server_{}_amd64.deb", version))).unwrap();
            file.set_times(FileTimes::new().set_modified(base + Duration::from_secs(i as u64 * 60)))
                .unwrap();
        }
        let runner = Arc::new(ScriptedRunner::new().respond(
            "aptly",
            0,
            &[
                "arvados-server_2.7.0_amd64",
                "arvados-server_2.7.1_amd64",
                "arvados-server_2.7.2_amd64",
            ],
        ));
        let mut options = AtticOptions::new("bookworm-dev");
        options.repo_dir = temp_dir.path().to_path_buf();
        options.min_packages = 1;

        let report = retire(&options, runner.clone()).await.unwrap();

        assert_eq!(report.examined, 3);
        assert_eq!(report.moved, vec!["arvados-server_2.7.0_amd64", "arvados-server_2.7.1_amd64"]);
        assert!(report.published);
        assert_eq!(report.attic, "bookworm-attic");
        // search, two moves, two publish updates
        assert_eq!(runner.calls_to("aptly").len(), 5);
    }

    #[tokio::test]
    async fn test_retire_rejects_non_dev_before_running_anything() {
        let runner = Arc::new(ScriptedRunner::new());

        let result = retire(&AtticOptions::new("bookworm-attic"), runner.clone()).await;

        assert!(matches!(result, Err(UploadError::InvalidConfig { .. })));
        assert!(runner.calls().is_empty());
    }
}
