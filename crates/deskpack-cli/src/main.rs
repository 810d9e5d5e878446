//! deskpack - packaging guard rails for the desktop app
//!
//! ## Commands
//!
//! - `runtime check`: validate the Python runtime to embed and print its paths
//! - `runtime expected-version`: print the interpreter version the backend needs
//! - `build`: run the shell build, retrying transient failures
//! - `reclaim`: detach stale disk images from earlier macOS bundling runs
//! - `artifacts check`: reject merged release artifacts with clashing names

mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use deskpack_ci::{
    check_unique_artifact_names, run_with_retry, BuildCommand, BuildError, ProcessRunner,
    RetryPolicy, SignatureClassifier,
};
use deskpack_reclaim::{is_truthy, MacHost, RawReclaimConfig, ReclaimConfig, Reclaimer};
use deskpack_runtime::{
    locate_interpreter, resolve_expected_version, validate_runtime_source,
    validate_runtime_version, ProbeOptions, ProcessProber,
};

#[derive(Parser)]
#[command(name = "deskpack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Packaging checks and build helpers for the desktop app", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embedded Python runtime checks
    Runtime {
        #[command(subcommand)]
        action: RuntimeAction,
    },

    /// Run the shell build, retrying transient failures
    Build(BuildArgs),

    /// Detach disk images and helpers left behind by earlier bundling runs
    ///
    /// Best-effort: always exits successfully.
    Reclaim(ReclaimArgs),

    /// Release artifact checks
    Artifacts {
        #[command(subcommand)]
        action: ArtifactsAction,
    },
}

#[derive(Subcommand)]
enum RuntimeAction {
    /// Validate the runtime source and probe its interpreter
    Check(RuntimeCheckArgs),

    /// Print the interpreter version the backend requires
    ExpectedVersion(ProjectArgs),
}

#[derive(Subcommand)]
enum ArtifactsAction {
    /// Fail if two files anywhere under DIR share a name
    Check {
        /// Directory holding the merged artifacts
        dir: PathBuf,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project root (default: current directory)
    #[arg(long, env = "DESKPACK_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Directory containing the backend's pyproject.toml (default: project root)
    #[arg(long, env = "DESKPACK_BACKEND_SOURCE")]
    backend_source: Option<PathBuf>,

    /// Explicit `major.minor` interpreter version
    #[arg(long, env = "DESKPACK_PYTHON_VERSION")]
    python_version: Option<String>,
}

impl ProjectArgs {
    fn project_root(&self) -> Result<PathBuf> {
        match &self.project_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }

    fn backend_source(&self, project_root: &Path) -> PathBuf {
        match &self.backend_source {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.to_path_buf(),
        }
    }
}

#[derive(Args)]
struct RuntimeCheckArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Runtime directory to embed
    #[arg(long, env = "DESKPACK_RUNTIME_SOURCE")]
    runtime_source: Option<String>,

    /// Build output directory (default: <project>/resources/backend)
    #[arg(long, env = "DESKPACK_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Also require `import pip` to succeed (1/true/yes/on)
    #[arg(long, env = "DESKPACK_REQUIRE_PIP")]
    require_pip: Option<String>,
}

#[derive(Args)]
struct BuildArgs {
    /// Name used in logs
    #[arg(long, default_value = "shell")]
    name: String,

    /// Bundle targets, comma- or space-separated
    #[arg(long, env = "DESKPACK_BUNDLES")]
    bundles: Option<String>,

    /// Maximum attempts (1-6)
    #[arg(long, env = "DESKPACK_BUILD_MAX_ATTEMPTS")]
    max_attempts: Option<String>,

    /// Seconds to wait between attempts
    #[arg(long, env = "DESKPACK_BUILD_RETRY_DELAY_SECS")]
    retry_delay: Option<String>,

    /// Per-attempt timeout in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Build command and its arguments
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Args)]
struct ReclaimArgs {
    /// Workspace root whose images may be reclaimed
    #[arg(long, env = "DESKPACK_CLEANUP_ROOT")]
    root: Option<String>,

    #[arg(long, env = "GITHUB_WORKSPACE", hide = true)]
    ci_workspace: Option<String>,

    /// Detach attempts per target (1-10)
    #[arg(long, env = "DESKPACK_DETACH_ATTEMPTS")]
    detach_attempts: Option<String>,

    /// Seconds between detach attempts
    #[arg(long, env = "DESKPACK_DETACH_DELAY_SECS")]
    detach_delay: Option<String>,

    /// Kill every disk image helper when none is owned (1/true/yes/on)
    #[arg(long, env = "DESKPACK_GLOBAL_HELPER_CLEANUP")]
    global_helper_cleanup: Option<String>,
}

impl From<ReclaimArgs> for RawReclaimConfig {
    fn from(args: ReclaimArgs) -> Self {
        RawReclaimConfig {
            cleanup_root: args.root,
            ci_workspace: args.ci_workspace,
            detach_attempts: args.detach_attempts,
            detach_delay: args.detach_delay,
            global_helper_cleanup: args.global_helper_cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Runtime { action } => match action {
            RuntimeAction::Check(args) => cmd_runtime_check(args).await,
            RuntimeAction::ExpectedVersion(args) => cmd_expected_version(args).await,
        },
        Commands::Build(args) => cmd_build(args, cli.verbose).await,
        Commands::Reclaim(args) => cmd_reclaim(args, cli.json).await,
        Commands::Artifacts { action } => match action {
            ArtifactsAction::Check { dir } => cmd_artifacts_check(&dir),
        },
    }
}

async fn cmd_runtime_check(args: RuntimeCheckArgs) -> Result<()> {
    let project_root = args.project.project_root()?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| project_root.join("resources").join("backend"));

    let source =
        validate_runtime_source(&project_root, &output_dir, args.runtime_source.as_deref())
            .context("Runtime source rejected")?;

    let prober = ProcessProber::new();
    let constraint = resolve_expected_version(
        &args.project.backend_source(&project_root),
        args.project.python_version.as_deref(),
        &prober,
    )
    .await
    .context("Could not determine the required Python version")?;

    let interpreter = locate_interpreter(&source.path)?;
    let options = ProbeOptions {
        require_pip: args.require_pip.as_deref().is_some_and(is_truthy),
        ..ProbeOptions::default()
    };
    let probed = validate_runtime_version(&interpreter, &constraint, &options, &prober)
        .await
        .context("Runtime interpreter is not usable")?;

    info!(
        event = "runtime.accepted",
        home = %source.path.display(),
        python = %probed.interpreter.display(),
        version = %probed.version,
    );
    println!("DESKPACK_RUNTIME_HOME={}", source.path.display());
    println!("DESKPACK_RUNTIME_PYTHON={}", probed.interpreter.display());
    Ok(())
}

async fn cmd_expected_version(args: ProjectArgs) -> Result<()> {
    let project_root = args.project_root()?;
    let constraint = resolve_expected_version(
        &args.backend_source(&project_root),
        args.python_version.as_deref(),
        &ProcessProber::new(),
    )
    .await
    .context("Could not determine the required Python version")?;

    println!("{constraint}");
    Ok(())
}

async fn cmd_build(args: BuildArgs, verbose: bool) -> Result<()> {
    let command = BuildCommand::new(args.name, args.command)?
        .with_bundles(args.bundles.as_deref())
        .with_timeout(args.timeout);
    let policy = RetryPolicy::from_raw(args.max_attempts.as_deref(), args.retry_delay.as_deref());
    let runner = ProcessRunner { echo: verbose };

    match run_with_retry(&command, &policy, &runner, &SignatureClassifier::default()).await {
        Ok(outcome) => {
            println!("Build succeeded after {} attempt(s)", outcome.attempts);
            Ok(())
        }
        // The full output has already been logged by the retry controller.
        Err(e @ BuildError::Fatal { .. }) => Err(e.into()),
        Err(e) => Err(e).context("Build could not be started"),
    }
}

async fn cmd_reclaim(args: ReclaimArgs, json: bool) -> Result<()> {
    let config = ReclaimConfig::from_raw(&args.into());
    let report = match tokio::task::spawn_blocking(move || {
        Reclaimer::new(MacHost, config).reclaim()
    })
    .await
    {
        Ok(report) => report,
        Err(e) => {
            warn!(event = "reclaim.aborted", error = %e);
            return Ok(());
        }
    };

    if json {
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(event = "reclaim.report_unserializable", error = %e),
        }
    } else if report.skipped {
        println!("Reclaim skipped: no workspace root");
    } else {
        println!(
            "Reclaimed {} mount(s), {} image(s), {} helper(s) ({} failure(s) ignored)",
            report.mounts_detached.len(),
            report.images_detached.len(),
            report.pids_terminated.len(),
            report.failures,
        );
    }
    Ok(())
}

fn cmd_artifacts_check(dir: &Path) -> Result<()> {
    match check_unique_artifact_names(dir) {
        Ok(count) => {
            println!("{count} artifact(s) checked, all names unique");
            Ok(())
        }
        Err(BuildError::DuplicateArtifacts { duplicates }) => {
            for (name, paths) in &duplicates {
                eprintln!("duplicate artifact name: {name}");
                for path in paths {
                    eprintln!("  {}", path.display());
                }
            }
            anyhow::bail!("{} duplicate artifact name(s)", duplicates.len())
        }
        Err(e) => Err(e).context("Artifact check failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_takes_trailing_command() {
        let cli = Cli::try_parse_from([
            "deskpack", "build", "--max-attempts", "4", "--", "cargo", "tauri", "build",
            "--verbose",
        ])
        .unwrap();
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.max_attempts.as_deref(), Some("4"));
                assert_eq!(args.command, ["cargo", "tauri", "build", "--verbose"]);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_build_requires_command() {
        assert!(Cli::try_parse_from(["deskpack", "build"]).is_err());
    }

    #[test]
    fn test_backend_source_resolution() {
        let args = ProjectArgs {
            project_root: None,
            backend_source: Some(PathBuf::from("backend")),
            python_version: None,
        };
        assert_eq!(
            args.backend_source(Path::new("/proj")),
            PathBuf::from("/proj/backend")
        );

        let args = ProjectArgs {
            project_root: None,
            backend_source: None,
            python_version: None,
        };
        assert_eq!(args.backend_source(Path::new("/proj")), PathBuf::from("/proj"));
    }

    #[test]
    fn test_artifacts_check_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("a/App.dmg"), b"x").unwrap();
        std::fs::write(dir.path().join("b/App.msi"), b"x").unwrap();
        assert!(cmd_artifacts_check(dir.path()).is_ok());

        std::fs::write(dir.path().join("b/App.dmg"), b"x").unwrap();
        assert!(cmd_artifacts_check(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_reclaim_without_root_succeeds() {
        let args = ReclaimArgs {
            root: None,
            ci_workspace: None,
            detach_attempts: None,
            detach_delay: None,
            global_helper_cleanup: None,
        };
        assert!(cmd_reclaim(args, false).await.is_ok());
    }
}
