use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use smartorg::cli::{Command, PlanArgs, RunStatus, run};
use smartorg::executor::ConflictPolicy;
use smartorg::output::OutputFormatter;
use smartorg::planner::OperationKind;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "smartorg",
    version,
    about = "Organize files into folders built from templates like {Year}/{Month}/Photos."
)]
struct Cli {
    /// Settings file (defaults to ./.smartorgrc.toml, then ~/.config/smartorg/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show where every file would go, without touching anything.
    Preview {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Copy or move files to their planned destinations.
    Organize {
        #[command(flatten)]
        target: TargetArgs,

        /// Move files instead of copying them.
        #[arg(long = "move", conflicts_with = "copy")]
        move_files: bool,

        /// Copy files (the default unless configured otherwise).
        #[arg(long)]
        copy: bool,

        /// What to do when a destination file already exists.
        #[arg(long, value_name = "POLICY")]
        conflict: Option<CliConflictPolicy>,
    },
    /// Revert the last organize runs into an output folder.
    Undo {
        /// The output folder that was organized into.
        output: PathBuf,
    },
    /// List configured profiles and their rules.
    Profiles,
    /// List the tags usable in destination templates.
    Tags,
    /// Convert a legacy preset file to the current settings format.
    Migrate {
        /// Legacy preset file (JSON or unversioned TOML).
        legacy: PathBuf,

        /// Write the converted settings here instead of printing them.
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Folder to organize.
    root: PathBuf,

    /// Profile to apply.
    #[arg(long, short)]
    profile: String,

    /// Output folder (defaults to <ROOT>/Organized).
    #[arg(long, short, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Only look at files directly inside ROOT.
    #[arg(long)]
    no_recursive: bool,
}

impl From<TargetArgs> for PlanArgs {
    fn from(value: TargetArgs) -> Self {
        PlanArgs {
            root: value.root,
            profile: value.profile,
            output: value.output,
            recursive: value.no_recursive.then_some(false),
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliConflictPolicy {
    Skip,
    Overwrite,
    Rename,
}

impl From<CliConflictPolicy> for ConflictPolicy {
    fn from(value: CliConflictPolicy) -> Self {
        match value {
            CliConflictPolicy::Skip => ConflictPolicy::Skip,
            CliConflictPolicy::Overwrite => ConflictPolicy::Overwrite,
            CliConflictPolicy::Rename => ConflictPolicy::Rename,
        }
    }
}

impl From<Commands> for Command {
    fn from(value: Commands) -> Self {
        match value {
            Commands::Preview { target, json } => Command::Preview {
                args: target.into(),
                json,
            },
            Commands::Organize {
                target,
                move_files,
                copy,
                conflict,
            } => Command::Organize {
                args: target.into(),
                mode: match (move_files, copy) {
                    (true, _) => Some(OperationKind::Move),
                    (_, true) => Some(OperationKind::Copy),
                    _ => None,
                },
                conflict: conflict.map(Into::into),
            },
            Commands::Undo { output } => Command::Undo { output },
            Commands::Profiles => Command::Profiles,
            Commands::Tags => Command::Tags,
            Commands::Migrate { legacy, write } => Command::Migrate { legacy, write },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command.into(), cli.config.as_deref()) {
        Ok(RunStatus::Completed) => ExitCode::SUCCESS,
        Ok(RunStatus::PartialFailure) => ExitCode::FAILURE,
        Err(e) => {
            OutputFormatter::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
