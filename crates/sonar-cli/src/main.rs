use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sonar_core::Config;

mod commands;

/// Default log targets: this binary and the sequencer.
const LOG_DIRECTIVES: &[&str] = &["sonarctl=info", "sonar_sequencer=info"];

#[derive(Parser)]
#[command(
    name = "sonarctl",
    about = "Start SonarQube under Podman on demand and analyze projects",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to sonarctl.toml (default: ./sonarctl.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the SonarQube status endpoint.
    ///
    /// Exits 0 only when SonarQube reports itself up.
    Status {
        /// Print the full status as JSON
        #[arg(long)]
        json: bool,
        /// Additional attempts after the first
        #[arg(long)]
        retries: Option<u32>,
        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Start SonarQube if needed, analyze a project, then open the result.
    Analyze {
        #[command(flatten)]
        target: commands::analyze::TargetArgs,
        /// Run in this terminal instead of opening a new window
        #[arg(long)]
        inline: bool,
    },
    /// Print the commands `analyze` would run, without running them.
    Plan {
        #[command(flatten)]
        target: commands::analyze::TargetArgs,
        /// Assume this service state instead of probing
        /// (running, starting, down, timeout, error)
        #[arg(long)]
        state: Option<String>,
        /// With --state timeout: the assumed re-check state
        #[arg(long, requires = "state")]
        recheck: Option<String>,
    },
    /// Write a sonarctl.toml scaffold
    Init {
        /// Directory to write sonarctl.toml into
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Directory holding the SonarQube compose file
        #[arg(long, default_value = "~/sonarqube")]
        compose_dir: String,
        /// Overwrite an existing sonarctl.toml
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = || Config::discover(cli.config.as_deref());

    match cli.command {
        Commands::Status {
            json,
            retries,
            timeout_ms,
        } => commands::status::status(&config()?, json, retries, timeout_ms).await,
        Commands::Analyze { target, inline } => {
            commands::analyze::analyze(&config()?, &target, inline).await
        }
        Commands::Plan {
            target,
            state,
            recheck,
        } => {
            commands::analyze::plan(&config()?, &target, state.as_deref(), recheck.as_deref())
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init {
            path,
            compose_dir,
            force,
        } => {
            commands::init::init(&path, &compose_dir, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
