//! Moves retired packages into the attic repository and republishes both

use super::collector::PackageEntry;
use super::distro_base;
use crate::core::error::UploadError;
use crate::exec::{CommandRunner, CommandSpec};
use std::sync::Arc;

pub struct AtticMover {
    runner: Arc<dyn CommandRunner>,
    distro: String,
    dry_run: bool,
}

impl AtticMover {
    pub fn new(runner: Arc<dyn CommandRunner>, distro: &str, dry_run: bool) -> Self {
        Self {
            runner,
            distro: distro.to_string(),
            dry_run,
        }
    }

    /// Attic repository paired with the dev repository, e.g. `bookworm-attic`
    pub fn attic(&self) -> String {
        let base = self.distro.strip_suffix("-dev").unwrap_or(&self.distro);
        format!("{}-attic", base)
    }

    /// `aptly repo move [-dry-run] <distro> <attic> <key>` for each package
    pub async fn move_packages(&self, packages: &[PackageEntry]) -> Result<Vec<String>, UploadError> {
        let attic = self.attic();
        let mut moved = Vec::with_capacity(packages.len());

        for package in packages {
            tracing::info!(package = %package.key, destination = %attic, dry_run = self.dry_run, "moving");

            let mut args = vec!["repo".to_string(), "move".to_string()];
            if self.dry_run {
                args.push("-dry-run".to_string());
            }
            args.extend([self.distro.clone(), attic.clone(), package.key.clone()]);

            self.check(&CommandSpec::new("aptly", args)).await?;
            moved.push(package.key.clone());
        }

        Ok(moved)
    }

    /// Republish the dev and attic repositories; only logged in dry-run
    ///
    /// Returns whether the publish commands ran.
    pub async fn update_publications(&self) -> Result<bool, UploadError> {
        let base = distro_base(&self.distro);
        let endpoint = format!("filesystem:{}:", base);
        let commands: Vec<CommandSpec> = ["dev", "attic"]
            .iter()
            .map(|suffix| {
                CommandSpec::new(
                    "aptly",
                    [
                        "publish".to_string(),
                        "update".to_string(),
                        format!("{}-{}", base, suffix),
                        endpoint.clone(),
                    ],
                )
            })
            .collect();

        if self.dry_run {
            for cmd in &commands {
                tracing::warn!(command = %cmd, "dry-run: skipping");
            }
            return Ok(false);
        }

        for cmd in &commands {
            self.check(cmd).await?;
        }
        Ok(true)
    }

    async fn check(&self, cmd: &CommandSpec) -> Result<(), UploadError> {
        let exit_code = self
            .runner
            .run(cmd)
            .await
            .map_err(|e| UploadError::CommandLaunch {
                target: self.distro.clone(),
                program: e.program().to_string(),
                message: e.to_string(),
            })?;

        if exit_code != 0 {
            return Err(UploadError::CommandFailed {
                target: self.distro.clone(),
                command: cmd.to_string(),
                exit_code,
            });
        }
        Ok(())
    }
}
