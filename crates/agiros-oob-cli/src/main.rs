//! Main CLI entry point for the AGIROS out-of-band packaging tools

use std::path::PathBuf;

use agiros_oob_build::GenerateMode;
use agiros_oob_config::Config;
use agiros_oob_core::BuildKind;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

mod commands;

/// agiros-oob - generate, queue and build AGIROS packages out of band
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Configuration file path (global option)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and run the build queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Generate debian/ and rpm/ trees for the release directory
    Generate {
        /// What to generate: debian, spec, both or gbp
        #[arg(long, value_name = "MODE", default_value = "debian")]
        mode: GenerateMode,

        /// Process at most N release entries
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Sync debian/gbp.conf after a successful Debian generation
        #[arg(long)]
        generate_gbp: bool,

        /// Add a queue task for every generated tree
        #[arg(long)]
        enqueue: bool,

        /// Generate for one source directory instead of the release directory
        #[arg(long, value_name = "PATH")]
        package: Option<PathBuf>,
    },

    /// Write debian/gbp.conf for a source tree
    Gbp {
        /// Source tree
        path: PathBuf,

        /// Distro used in the tag
        #[arg(long, value_name = "DISTRO")]
        distro: Option<String>,

        /// Package name used in the tag
        #[arg(long, value_name = "NAME")]
        pkg: Option<String>,

        /// Section looked up in the track descriptor
        #[arg(long, value_name = "DISTRO")]
        tracks_distro: Option<String>,

        /// Update only the upstream keys of an existing gbp.conf
        #[arg(long)]
        patch: bool,
    },

    /// Inspect track descriptors
    Tracks {
        #[command(subcommand)]
        action: TracksAction,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List queued packages
    List,

    /// Add a build task for a source directory
    Add {
        /// Source directory
        path: PathBuf,

        /// Artifact kind
        #[arg(long, value_name = "KIND", default_value = "debian")]
        kind: BuildKind,

        /// Extra argument passed to the build command
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove a package by name or 1-based index
    Remove {
        /// Package name or index
        target: String,
    },

    /// Replace the extra arguments of a task
    SetArgs {
        /// Package name
        name: String,

        /// Artifact kind
        #[arg(long, value_name = "KIND")]
        kind: BuildKind,

        /// New extra arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove every package
    Clear,

    /// Build pending packages in queue order
    Run {
        /// Continue after failures without asking
        #[arg(long, conflicts_with = "stop_on_failure")]
        keep_going: bool,

        /// Stop at the first failed package without asking
        #[arg(long)]
        stop_on_failure: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TracksAction {
    /// Print the values resolved from a descriptor
    Show {
        /// Descriptor file
        file: PathBuf,

        /// Section to resolve, defaults to the configured one
        #[arg(long, value_name = "DISTRO")]
        distro: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as YAML
    Show {
        /// Also check directories and external tools
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet)?;

    let mut config = Config::load(cli.config.as_deref()).wrap_err_with(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;
    if cli.dry_run {
        config = config.with_dry_run(true);
    }
    let show_progress = cli.quiet == 0;

    let result = match cli.command {
        Commands::Queue { action } => {
            let command = commands::QueueCommand::new(config, show_progress);
            match action {
                QueueAction::List => command.list(),
                QueueAction::Add { path, kind, args } => command.add(&path, kind, args),
                QueueAction::Remove { target } => command.remove(&target),
                QueueAction::SetArgs { name, kind, args } => command.set_args(&name, kind, args),
                QueueAction::Clear => command.clear(),
                QueueAction::Run { keep_going, stop_on_failure } => {
                    command.run(keep_going, stop_on_failure).await
                }
            }
        }

        Commands::Generate { mode, limit, generate_gbp, enqueue, package } => {
            if generate_gbp {
                config.generate_gbp = true;
            }
            let command =
                commands::GenerateCommand::new(config, mode, limit, enqueue, package, show_progress);
            command.execute().await
        }

        Commands::Gbp { path, distro, pkg, tracks_distro, patch } => {
            let command = commands::GbpCommand::new(config, path, distro, pkg, tracks_distro, patch);
            command.execute().await
        }

        Commands::Tracks { action: TracksAction::Show { file, distro } } => {
            let command = commands::TracksCommand::new(config, file, distro);
            command.execute().await
        }

        Commands::Config { action: ConfigAction::Show { check } } => {
            let command = commands::ConfigCommand::new(config, check);
            command.execute().await
        }
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (_, 0) => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, _) => "off",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
