//! Server-side publish scripts
//!
//! Each script is run as `bash -ec <script> <name> <args…>`, so `$0` is the
//! suite name and the positional parameters are the staging directory, the
//! repository (distro name or directory) and the staged file names.

/// Adds staged .deb files to an aptly repository and republishes it
///
/// Packages the repository already holds are deleted from staging instead of
/// being re-added.
pub const APT_SCRIPT: &str = r#"
set -e
cd "$1"; shift
DISTNAME=$1; shift
# We increase database open attempts to accommodate parallel upload jobs.
aptly() {
  command aptly -db-open-attempts=60 "$@"
}
for package in "$@"; do
  if aptly repo search "$DISTNAME" "${package%.deb}" >/dev/null; then
    echo "Not adding $package, it is already present in repo $DISTNAME"
    rm "$package"
  else
    aptly repo add -remove-files "$DISTNAME" "$package"
  fi
done
aptly publish update "$DISTNAME" filesystem:"${DISTNAME%-*}":
"#;

/// Signs staged .rpm files, moves them into the served repository and
/// refreshes its metadata using a persistent createrepo cache
pub const CREATEREPO_SCRIPT: &str = r#"
cd "$1"; shift
REPODIR=$1; shift
rpmsign --addsign "$@" </dev/null
mv "$@" "$REPODIR"
createrepo_c -c ~/.createrepo-cache --update "$REPODIR"
"#;

/// One execution of a publish script: template plus positional arguments
///
/// Built fresh for each finalize call and consumed by the remote runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteScript {
    /// Becomes `$0`; only used in the script's own error messages
    pub program_name: String,
    pub body: &'static str,
    pub args: Vec<String>,
}

impl RemoteScript {
    pub fn apt_publish(program_name: &str, dest_dir: &str, distname: &str, basenames: &[String]) -> Self {
        Self::with_args(program_name, APT_SCRIPT, dest_dir, distname, basenames)
    }

    pub fn createrepo(program_name: &str, dest_dir: &str, repo_dir: &str, basenames: &[String]) -> Self {
        Self::with_args(program_name, CREATEREPO_SCRIPT, dest_dir, repo_dir, basenames)
    }

    fn with_args(
        program_name: &str,
        body: &'static str,
        dest_dir: &str,
        repository: &str,
        basenames: &[String],
    ) -> Self {
        let mut args = Vec::with_capacity(basenames.len() + 2);
        args.push(dest_dir.to_string());
        args.push(repository.to_string());
        args.extend(basenames.iter().cloned());

        Self {
            program_name: program_name.to_string(),
            body,
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apt_publish_argument_order() {
        let basenames = vec!["a_1.0_amd64.deb".to_string(), "b_2.0_amd64.deb".to_string()];

        let script = RemoteScript::apt_publish("debian-suite", "tmp/debian12", "bookworm-dev", &basenames);

        assert_eq!(script.body, APT_SCRIPT);
        assert_eq!(
            script.args,
            vec!["tmp/debian12", "bookworm-dev", "a_1.0_amd64.deb", "b_2.0_amd64.deb"]
        );
    }

    #[test]
    fn test_createrepo_argument_order() {
        let script = RemoteScript::createrepo(
            "redhat-suite",
            "tmp/rocky8",
            "/var/www/rpm.arvados.org/RHEL/8/dev/x86_64/",
            &["arvados-server-2.7.0-1.x86_64.rpm".to_string()],
        );

        assert_eq!(script.body, CREATEREPO_SCRIPT);
        assert_eq!(script.args[1], "/var/www/rpm.arvados.org/RHEL/8/dev/x86_64/");
        assert_eq!(script.args.len(), 3);
    }

    #[test]
    fn test_apt_script_publishes_filesystem_endpoint() {
        assert!(APT_SCRIPT.contains(r#"filesystem:"${DISTNAME%-*}":"#));
        assert!(APT_SCRIPT.contains("-db-open-attempts=60"));
    }
}
