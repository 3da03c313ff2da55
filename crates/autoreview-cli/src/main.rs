mod cmd;
mod exit;
mod hosted;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "autoreview",
    about = "AI review of pull and merge requests: run, inspect and post reviews",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .autoreview/ or .git/)
    #[arg(long, global = true, env = "AUTOREVIEW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the review backend, platform CLI and runtime are ready
    Validate,

    /// Run a review of a pull/merge request
    Review {
        number: u64,

        /// Follow-up review against the previous result
        #[arg(long)]
        followup: bool,

        /// Start immediately instead of waiting for running CI checks
        #[arg(long)]
        no_ci_wait: bool,
    },

    /// Report commits pushed since the last review
    CheckCommits { number: u64 },

    /// Report whether the item can be merged
    MergeReadiness { number: u64 },

    /// Show the stored review
    Show { number: u64 },

    /// Show the phase logs of the last review run
    Logs { number: u64 },

    /// Post the stored review's findings to the platform
    Post {
        number: u64,

        /// Post only these finding ids (repeatable; default: all)
        #[arg(long = "finding")]
        findings: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Review { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Review {
            number,
            followup,
            no_ci_wait,
        } => cmd::review::run(&root, number, followup, !no_ci_wait, cli.json),
        Commands::CheckCommits { number } => cmd::check_commits::run(&root, number, cli.json),
        Commands::MergeReadiness { number } => cmd::merge_readiness::run(&root, number, cli.json),
        Commands::Show { number } => cmd::show::run(&root, number, cli.json),
        Commands::Logs { number } => cmd::logs::run(&root, number, cli.json),
        Commands::Post { number, findings } => cmd::post::run(&root, number, findings, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(exit::code_for(&e));
    }
}
