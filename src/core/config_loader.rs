//! Targets file loader for package-uploader
//!
//! Loads the optional YAML targets file, expands `${VAR}` references from the
//! environment and validates the result before anything is uploaded.

use super::config::*;
use crate::core::error::UploadError;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Targets file looked up in the workspace when none is given explicitly
pub const CONFIG_FILENAME: &str = ".upload-targets.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Targets file load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Workspace searched for `.upload-targets.yaml`
    pub workspace: PathBuf,

    /// Explicit targets file; must exist when given
    pub config_path: Option<PathBuf>,

    /// Environment variables used for `${VAR}` expansion
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "targets.debian13.codename")
    pub field: String,
    pub message: String,
}

/// Targets file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load, expand and validate the targets file
    ///
    /// Returns `Ok(None)` when no explicit file was given and the workspace
    /// has none.
    pub async fn load(options: &ConfigLoadOptions) -> Result<Option<TargetsFile>, UploadError> {
        let path = match &options.config_path {
            Some(path) => path.clone(),
            None => {
                let default_path = options.workspace.join(CONFIG_FILENAME);
                if !default_path.exists() {
                    return Ok(None);
                }
                default_path
            }
        };

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| config_error(format!("failed to read {}: {}", path.display(), e)))?;

        let file = Self::parse(&content, &options.env)?;
        tracing::debug!(path = %path.display(), targets = file.targets.len(), "loaded targets file");

        Ok(Some(file))
    }

    /// Parse YAML text after `${VAR}` expansion and validate it
    pub fn parse(content: &str, env: &HashMap<String, String>) -> Result<TargetsFile, UploadError> {
        let expanded = Self::expand_env_vars(content, env)?;

        let file: TargetsFile = serde_yaml::from_str(&expanded)
            .map_err(|e| config_error(format!("failed to parse targets file: {}", e)))?;

        let validation = Self::validate(&file);
        if !validation.valid {
            let message = validation
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(config_error(message));
        }

        Ok(file)
    }

    /// Replace every `${VAR}` with its value; an undefined variable is an error
    pub fn expand_env_vars(
        content: &str,
        env: &HashMap<String, String>,
    ) -> Result<String, UploadError> {
        let re = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| config_error(format!("invalid variable pattern: {}", e)))?;

        let missing: Vec<&str> = re
            .captures_iter(content)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !env.contains_key(*name))
            .collect();
        if let Some(name) = missing.first() {
            return Err(config_error(format!(
                "environment variable {} is not set",
                name
            )));
        }

        Ok(re
            .replace_all(content, |caps: &regex::Captures| env[&caps[1]].clone())
            .into_owned())
    }

    /// Check every target entry, collecting all problems
    pub fn validate(file: &TargetsFile) -> ConfigValidationResult {
        let mut errors = Vec::new();

        if file.remote.dest_dir.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "remote.dest_dir".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        for (name, spec) in &file.targets {
            let field = |suffix: &str| format!("targets.{}.{}", name, suffix);

            if !is_valid_target_name(name) {
                errors.push(ConfigValidationError {
                    field: format!("targets.{}", name),
                    message: "target names must not be `all` and may only use [A-Za-z0-9._-]"
                        .to_string(),
                });
            }

            if !spec.is_enabled() {
                continue;
            }

            match spec.kind {
                None => errors.push(ConfigValidationError {
                    field: field("kind"),
                    message: "required for enabled targets (python, gem, debian, redhat)"
                        .to_string(),
                }),
                Some(SuiteKind::Python | SuiteKind::Gem) if spec.globs.is_empty() => {
                    errors.push(ConfigValidationError {
                        field: field("globs"),
                        message: "language package targets need at least one glob".to_string(),
                    })
                }
                Some(SuiteKind::Debian) if spec.codename.as_deref().is_none_or(str::is_empty) => {
                    errors.push(ConfigValidationError {
                        field: field("codename"),
                        message: "debian targets need a release codename".to_string(),
                    })
                }
                Some(SuiteKind::Redhat) if spec.release.as_deref().is_none_or(str::is_empty) => {
                    errors.push(ConfigValidationError {
                        field: field("release"),
                        message: "redhat targets need a release number".to_string(),
                    })
                }
                _ => {}
            }

            for (index, glob) in spec.globs.iter().enumerate() {
                if Path::new(glob).is_absolute() {
                    errors.push(ConfigValidationError {
                        field: format!("targets.{}.globs[{}]", name, index),
                        message: "globs are relative to the workspace".to_string(),
                    });
                } else if let Err(e) = glob::Pattern::new(glob) {
                    errors.push(ConfigValidationError {
                        field: format!("targets.{}.globs[{}]", name, index),
                        message: e.to_string(),
                    });
                }
            }
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Target names end up in remote paths, so they stay within `[A-Za-z0-9._-]`
fn is_valid_target_name(name: &str) -> bool {
    !name.is_empty()
        && name != "all"
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn config_error(message: String) -> UploadError {
    UploadError::InvalidConfig {
        target: "*".to_string(),
        message,
    }
}
