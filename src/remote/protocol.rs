//! Stage-then-execute protocol for remote repository hosts
//!
//! Files are staged with one `ssh … install -d` and one `scp`, then a publish
//! script is executed over ssh. ssh hands its arguments to the remote login
//! shell as one string, so the script body and every positional argument are
//! shell-quoted here.

use super::scripts::RemoteScript;
use crate::core::error::UploadError;
use crate::exec::{CommandRunner, CommandSpec, quote};
use std::path::PathBuf;
use std::sync::Arc;

/// Connection settings for the repository host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub host: String,
    /// Already in `-o<option>` form, plus `-q` when quiet
    ssh_args: Vec<String>,
}

impl RemoteHost {
    /// `quiet` adds `-q` so ssh/scp keep their banners and progress to themselves
    pub fn new(host: &str, ssh_opts: &[String], quiet: bool) -> Self {
        let mut ssh_args: Vec<String> = ssh_opts.iter().map(|opt| format!("-o{}", opt)).collect();
        if quiet {
            ssh_args.push("-q".to_string());
        }

        Self {
            host: host.to_string(),
            ssh_args,
        }
    }

    fn build_cmd<I, S>(&self, base: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all: Vec<String> = self.ssh_args.clone();
        all.extend(args.into_iter().map(Into::into));
        CommandSpec::new(base, all)
    }

    /// `ssh <opts> <host> install -d '<dest_dir>'`
    pub fn mkdir_cmd(&self, dest_dir: &str) -> CommandSpec {
        let args = [self.host.clone(), "install".into(), "-d".into(), quote(dest_dir)];
        self.build_cmd("ssh", args)
    }

    /// `scp <opts> <paths…> <host>:<dest_dir>`
    pub fn copy_cmd(&self, paths: &[PathBuf], dest_dir: &str) -> CommandSpec {
        let mut args: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        args.push(format!("{}:{}", self.host, dest_dir));
        self.build_cmd("scp", args)
    }

    /// `ssh <opts> <host> bash -ec '<script>' <name> '<args>'…`
    pub fn script_cmd(&self, script: &RemoteScript) -> CommandSpec {
        let mut args = vec![
            self.host.clone(),
            "bash".to_string(),
            "-ec".to_string(),
            quote(script.body),
            quote(&script.program_name),
        ];
        args.extend(script.args.iter().map(|arg| quote(arg)));
        self.build_cmd("ssh", args)
    }
}

/// Runs the protocol's commands for one target
pub struct RemotePublisher {
    target: String,
    host: RemoteHost,
    runner: Arc<dyn CommandRunner>,
}

impl RemotePublisher {
    pub fn new(target: &str, host: RemoteHost, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            target: target.to_string(),
            host,
            runner,
        }
    }

    pub fn host(&self) -> &RemoteHost {
        &self.host
    }

    /// Create `dest_dir` on the host and copy every file there in one transfer
    pub async fn stage(&self, paths: &[PathBuf], dest_dir: &str) -> Result<(), UploadError> {
        self.check(&self.host.mkdir_cmd(dest_dir)).await?;
        tracing::info!(
            count = paths.len(),
            host = %self.host.host,
            dest_dir,
            "copying packages"
        );
        self.check(&self.host.copy_cmd(paths, dest_dir)).await
    }

    /// Execute a publish script on the host
    pub async fn execute(&self, script: &RemoteScript) -> Result<(), UploadError> {
        tracing::info!(
            host = %self.host.host,
            script = %script.program_name,
            files = script.args.len().saturating_sub(2),
            "running remote publish script"
        );
        self.check(&self.host.script_cmd(script)).await
    }

    async fn check(&self, cmd: &CommandSpec) -> Result<(), UploadError> {
        let exit_code = self
            .runner
            .run(cmd)
            .await
            .map_err(|e| UploadError::CommandLaunch {
                target: self.target.clone(),
                program: e.program().to_string(),
                message: e.to_string(),
            })?;

        if exit_code != 0 {
            return Err(UploadError::CommandFailed {
                target: self.target.clone(),
                command: cmd.program.clone(),
                exit_code,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::remote::scripts::APT_SCRIPT;

    fn host(quiet: bool) -> RemoteHost {
        RemoteHost::new(
            "repo.example.org",
            &["BatchMode=yes".to_string(), "StrictHostKeyChecking=no".to_string()],
            quiet,
        )
    }

    #[test]
    fn test_mkdir_cmd() {
        let cmd = host(false).mkdir_cmd("tmp/debian12");

        assert_eq!(cmd.program, "ssh");
        assert_eq!(
            cmd.args,
            vec![
                "-oBatchMode=yes",
                "-oStrictHostKeyChecking=no",
                "repo.example.org",
                "install",
                "-d",
                "tmp/debian12"
            ]
        );
    }

    #[test]
    fn test_mkdir_cmd_quotes_dest_dir() {
        let cmd = host(true).mkdir_cmd("my staging/deb;touch$IFSpwned");

        assert_eq!(cmd.args[3], "repo.example.org");
        assert_eq!(
            &cmd.args[4..],
            &["install", "-d", "'my staging/deb;touch$IFSpwned'"]
        );
    }

    #[test]
    fn test_quiet_adds_q_flag() {
        let cmd = host(true).mkdir_cmd("tmp/x");

        assert_eq!(cmd.args[2], "-q");
    }

    #[test]
    fn test_copy_cmd_ends_with_destination() {
        let paths = vec![PathBuf::from("/ws/packages/debian12/a.deb"), PathBuf::from("/ws/packages/debian12/b.deb")];

        let cmd = host(false).copy_cmd(&paths, "tmp/debian12");

        assert_eq!(cmd.program, "scp");
        assert_eq!(cmd.args.last().unwrap(), "repo.example.org:tmp/debian12");
        assert!(cmd.args.contains(&"/ws/packages/debian12/a.deb".to_string()));
        assert!(cmd.args.contains(&"/ws/packages/debian12/b.deb".to_string()));
    }

    #[test]
    fn test_script_cmd_quotes_every_argument() {
        let script = RemoteScript::apt_publish(
            "debian-suite",
            "tmp/debian12",
            "bookworm-dev",
            &["weird name;rm -rf ~.deb".to_string()],
        );

        let cmd = host(false).script_cmd(&script);

        let args = &cmd.args[2..];
        assert_eq!(args[0], "repo.example.org");
        assert_eq!(args[1], "bash");
        assert_eq!(args[2], "-ec");
        assert_eq!(args[3], quote(APT_SCRIPT));
        assert_eq!(args[4], "debian-suite");
        assert_eq!(args[5], "tmp/debian12");
        assert_eq!(args[6], "bookworm-dev");
        assert_eq!(args[7], "'weird name;rm -rf ~.deb'");
    }

    #[tokio::test]
    async fn test_stage_runs_mkdir_then_single_copy() {
        let runner = Arc::new(ScriptedRunner::new());
        let publisher = RemotePublisher::new("debian12", host(false), runner.clone());

        publisher
            .stage(&[PathBuf::from("/a.deb"), PathBuf::from("/b.deb")], "tmp/debian12")
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "ssh");
        assert_eq!(calls[1].program, "scp");
    }

    #[tokio::test]
    async fn test_stage_stops_when_mkdir_fails() {
        let runner = Arc::new(ScriptedRunner::new().respond("ssh", 255, &[]));
        let publisher = RemotePublisher::new("debian12", host(false), runner.clone());

        let result = publisher.stage(&[PathBuf::from("/a.deb")], "tmp/debian12").await;

        assert!(matches!(
            result,
            Err(UploadError::CommandFailed { exit_code: 255, .. })
        ));
        assert!(runner.calls_to("scp").is_empty());
    }

    #[tokio::test]
    async fn test_execute_missing_ssh_is_launch_error() {
        let runner = Arc::new(ScriptedRunner::new().missing("ssh"));
        let publisher = RemotePublisher::new("rocky8", host(false), runner);
        let script = RemoteScript::createrepo("redhat-suite", "tmp/rocky8", "/repo/", &[]);

        let result = publisher.execute(&script).await;

        assert!(matches!(result, Err(UploadError::CommandLaunch { .. })));
    }
}
