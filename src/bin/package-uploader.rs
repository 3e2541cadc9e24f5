//! Package Uploader CLI
//!
//! Incremental, idempotent upload of built packages to their repositories

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use package_uploader::attic::{self, AtticOptions, DEFAULT_MIN_PACKAGES, DEFAULT_REPO_DIR};
use package_uploader::core::{ConfigLoadOptions, ConfigLoader, RepoChannel, UploadConfig, UploadError};
use package_uploader::exec::{CommandRunner, SystemRunner};
use package_uploader::orchestration::{BatchUploadOptions, BatchUploader, TargetUploader};
use package_uploader::suites::{SuiteContext, TargetRegistry};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::Level;

/// Upload built packages to package indexes and distribution repositories
#[derive(Parser)]
#[command(name = "package-uploader")]
#[command(version)]
#[command(about = "Upload built packages to package indexes and distribution repositories", long_about = None)]
struct Cli {
    /// Log more information and subcommand output (repeat for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload everything built since the last successful upload
    Upload(UploadArgs),

    /// Move stale packages from a dev repository to its attic
    Retire(RetireArgs),

    /// List the available targets
    Targets {
        /// Source directory searched for the targets file
        #[arg(short = 'W', long, env = "WORKSPACE")]
        workspace: Option<PathBuf>,

        /// Targets file (default: <workspace>/.upload-targets.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct UploadArgs {
    /// Source directory with built packages to upload
    #[arg(short = 'W', long, env = "WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Host specification for the distribution repository server
    #[arg(short = 'H', long)]
    ssh_host: Option<String>,

    /// Pass option to `ssh -o`
    #[arg(short = 'o', value_name = "OPTION")]
    ssh_opts: Vec<String>,

    /// Upload to the dev (nightly) or testing (release candidate) repository
    #[arg(long, value_enum, default_value_t = RepoArg::Dev)]
    repo: RepoArg,

    /// Targets file (default: <workspace>/.upload-targets.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep going with the next target after one fails
    #[arg(long)]
    continue_on_error: bool,

    /// Print the batch result as JSON
    #[arg(long)]
    json: bool,

    /// Upload packages to these targets (`all` for every language package target)
    #[arg(value_name = "TARGET", default_value = "all")]
    targets: Vec<String>,
}

#[derive(Args)]
struct RetireArgs {
    /// Dev repository to process, e.g. bookworm-dev
    distro: String,

    /// Parent directory of the aptly repositories
    #[arg(long, default_value = DEFAULT_REPO_DIR)]
    repo_dir: PathBuf,

    /// Minimum number of versions of each package to leave in the repository
    /// (0 leaves none, so every version older than the cut-off is moved)
    #[arg(long, default_value_t = DEFAULT_MIN_PACKAGES)]
    min_packages: usize,

    /// Cut-off date in format YYYY-MM-DD (default: today)
    #[arg(long, value_parser = parse_date)]
    cutoff_date: Option<NaiveDate>,

    /// Show what would be done, without doing it
    #[arg(long)]
    dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RepoArg {
    Dev,
    Testing,
}

impl From<RepoArg> for RepoChannel {
    fn from(arg: RepoArg) -> Self {
        match arg {
            RepoArg::Dev => RepoChannel::Dev,
            RepoArg::Testing => RepoChannel::Testing,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{}: expected YYYY-MM-DD", e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            let exit_code = match e.downcast_ref::<UploadError>() {
                Some(err) => {
                    for action in err.suggested_actions() {
                        eprintln!("  hint: {}", action);
                    }
                    err.exit_code()
                }
                None => 1,
            };
            process::exit(exit_code);
        }
    }
}

/// 0 → warnings, 1 → info, 2+ → debug, all on stderr
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Upload(args) => upload_command(args, cli.verbose).await,
        Commands::Retire(args) => retire_command(args).await,
        Commands::Targets { workspace, config } => targets_command(workspace, config).await,
    }
}

async fn load_registry(workspace: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<TargetRegistry> {
    if workspace.is_none() && config_path.is_none() {
        return Ok(TargetRegistry::builtin());
    }

    let options = ConfigLoadOptions {
        workspace: workspace.unwrap_or_else(|| PathBuf::from(".")),
        config_path,
        env: std::env::vars().collect(),
    };
    let file = ConfigLoader::load(&options).await?;
    Ok(TargetRegistry::with_overrides(file)?)
}

async fn upload_command(args: UploadArgs, verbosity: u8) -> Result<i32> {
    let workspace = args.workspace.ok_or(UploadError::WorkspaceNotSet)?;

    let mut config = UploadConfig::new(workspace);
    config.targets = args.targets;
    config.ssh_host = args.ssh_host;
    config.ssh_opts = args.ssh_opts;
    config.verbosity = verbosity;
    config.repo = args.repo.into();
    config.continue_on_error = args.continue_on_error;

    let registry = load_registry(Some(config.workspace.clone()), args.config).await?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let uploader = TargetUploader::new(registry, SuiteContext::from_config(&config, runner));

    let result = BatchUploader::new(uploader)
        .upload_targets(&config.targets, &BatchUploadOptions::from(&config))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if config.is_verbose() || !result.success {
        for line in result.summary_lines() {
            eprintln!("{}", line);
        }
    }

    Ok(result.exit_code)
}

async fn retire_command(args: RetireArgs) -> Result<i32> {
    let options = AtticOptions {
        distro: args.distro,
        repo_dir: args.repo_dir,
        min_packages: args.min_packages,
        cutoff_date: args.cutoff_date,
        dry_run: args.dry_run,
    };

    let report = attic::retire(&options, Arc::new(SystemRunner::new())).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let verb = if report.dry_run { "would move" } else { "moved" };
        println!(
            "{}: {} {} of {} packages to {}",
            report.distro,
            verb,
            report.moved.len(),
            report.examined,
            report.attic
        );
    }

    Ok(0)
}

async fn targets_command(workspace: Option<PathBuf>, config: Option<PathBuf>) -> Result<i32> {
    let registry = load_registry(workspace, config).await?;

    for def in registry.definitions() {
        let kind = serde_json::to_value(def.kind.suite_kind())?;
        println!(
            "{:<12} {:<7} {}",
            def.name,
            kind.as_str().unwrap_or_default(),
            def.globs.join(" ")
        );
    }

    Ok(0)
}
