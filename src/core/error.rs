//! Error handling for package uploads
//!
//! Every failure the library can report is a variant of [`UploadError`].
//! Configuration errors are raised before any upload starts; command failures
//! carry the external tool's exit code so the binary can surface it.

use thiserror::Error;

/// Main error type for upload operations
#[derive(Error, Debug)]
pub enum UploadError {
    // Configuration errors
    #[error("[{target}] unrecognized target")]
    UnknownTarget { target: String },

    #[error("[{target}] --ssh-host must be specified to upload distribution packages")]
    MissingRemoteHost { target: String },

    #[error("workspace not set from command line or environment")]
    WorkspaceNotSet,

    #[error("[{target}] invalid configuration: {message}")]
    InvalidConfig { target: String, message: String },

    #[error("[{target}] invalid glob pattern {pattern:?}: {message}")]
    InvalidGlob {
        target: String,
        pattern: String,
        message: String,
    },

    // Filesystem errors
    #[error("[{target}] cannot inspect {path}: {message}")]
    Io {
        target: String,
        path: String,
        message: String,
    },

    // Command execution errors
    #[error("[{target}] failed to launch {program}: {message}")]
    CommandLaunch {
        target: String,
        program: String,
        message: String,
    },

    #[error("[{target}] command `{command}` exited with status {exit_code}")]
    CommandFailed {
        target: String,
        command: String,
        exit_code: i32,
    },

    // Upload errors
    #[error("[{target}] upload of {path} failed with status {exit_code}")]
    UploadFailed {
        target: String,
        path: String,
        exit_code: i32,
    },
}

impl UploadError {
    /// Get the target name associated with this error
    ///
    /// Errors that are not tied to a target (an unset workspace) report `"*"`.
    pub fn target(&self) -> &str {
        match self {
            Self::WorkspaceNotSet => "*",
            Self::UnknownTarget { target }
            | Self::MissingRemoteHost { target }
            | Self::InvalidConfig { target, .. }
            | Self::InvalidGlob { target, .. }
            | Self::Io { target, .. }
            | Self::CommandLaunch { target, .. }
            | Self::CommandFailed { target, .. }
            | Self::UploadFailed { target, .. } => target,
        }
    }

    /// Configuration errors are detected before any side effect happens
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTarget { .. }
                | Self::MissingRemoteHost { .. }
                | Self::WorkspaceNotSet
                | Self::InvalidConfig { .. }
                | Self::InvalidGlob { .. }
        )
    }

    /// Process exit code to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { exit_code, .. } | Self::UploadFailed { exit_code, .. }
                if *exit_code != 0 =>
            {
                *exit_code
            }
            e if e.is_configuration_error() => 2,
            _ => 1,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::UnknownTarget { .. } => vec![
                "Run `package-uploader targets` to list the available targets",
                "Check the targets file for a disabled or misspelled entry",
            ],
            Self::MissingRemoteHost { .. } => {
                vec!["Pass --ssh-host with the repository server's host specification"]
            }
            Self::WorkspaceNotSet => {
                vec!["Pass --workspace or set the WORKSPACE environment variable"]
            }
            Self::InvalidConfig { .. } => vec![
                "Fix the reported field in the targets file",
                "Make sure every ${VAR} reference is defined in the environment",
            ],
            Self::InvalidGlob { .. } => vec!["Fix the glob pattern syntax"],
            Self::Io { .. } => vec!["Check the file permissions in the workspace"],
            Self::CommandLaunch { .. } => vec![
                "Check that the client tool is installed and on PATH",
            ],
            Self::CommandFailed { .. } => vec![
                "Check the command output above",
                "Check the network connection to the repository host",
            ],
            Self::UploadFailed { .. } => vec![
                "Check the upload client's output above",
                "Re-run the upload: the marker was not advanced, so the same files will be retried",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTarget { .. } => "UNKNOWN_TARGET",
            Self::MissingRemoteHost { .. } => "MISSING_REMOTE_HOST",
            Self::WorkspaceNotSet => "WORKSPACE_NOT_SET",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::InvalidGlob { .. } => "INVALID_GLOB",
            Self::Io { .. } => "IO_ERROR",
            Self::CommandLaunch { .. } => "COMMAND_LAUNCH",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::UploadFailed { .. } => "UPLOAD_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_target_is_configuration_error() {
        let error = UploadError::UnknownTarget {
            target: "debian99".to_string(),
        };

        assert_eq!(error.target(), "debian99");
        assert!(error.is_configuration_error());
        assert_eq!(error.exit_code(), 2);
        assert_eq!(error.code(), "UNKNOWN_TARGET");
        assert!(!error.suggested_actions().is_empty());
    }

    #[test]
    fn test_missing_remote_host_message() {
        let error = UploadError::MissingRemoteHost {
            target: "debian12".to_string(),
        };

        assert!(error.to_string().contains("--ssh-host"));
        assert!(error.is_configuration_error());
    }

    #[test]
    fn test_workspace_not_set_has_wildcard_target() {
        let error = UploadError::WorkspaceNotSet;

        assert_eq!(error.target(), "*");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_command_failed_surfaces_tool_exit_code() {
        let error = UploadError::CommandFailed {
            target: "rocky8".to_string(),
            command: "scp".to_string(),
            exit_code: 255,
        };

        assert!(!error.is_configuration_error());
        assert_eq!(error.exit_code(), 255);
        assert_eq!(error.code(), "COMMAND_FAILED");
    }

    #[test]
    fn test_upload_failed_with_zero_code_falls_back_to_one() {
        let error = UploadError::UploadFailed {
            target: "gems".to_string(),
            path: "sdk/ruby/arvados-2.7.0.gem".to_string(),
            exit_code: 0,
        };

        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_launch_failure_is_not_configuration() {
        let error = UploadError::CommandLaunch {
            target: "python".to_string(),
            program: "twine".to_string(),
            message: "No such file or directory".to_string(),
        };

        assert_eq!(error.exit_code(), 1);
        let display = format!("{}", error);
        assert!(display.contains("twine"));
        assert!(display.contains("[python]"));
    }
}
