mod cmd;
mod file;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{action::ActionSubcommand, group::GroupSubcommand, job::JobSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "actiongraph",
    about = "Compose reusable CI actions into ordered, parameterised graphs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding .actiongraph/ (default: auto-detect upward from cwd)
    #[arg(long, global = true, env = "ACTIONGRAPH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .actiongraph/ with a default config and an empty database
    Init,

    /// Manage groups
    Group {
        #[command(subcommand)]
        subcommand: GroupSubcommand,
    },

    /// Create, edit, inspect and delete actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Register pipeline jobs that reference actions
    Job {
        #[command(subcommand)]
        subcommand: JobSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Group { subcommand } => cmd::group::run(&root, subcommand, cli.json),
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json),
        Commands::Job { subcommand } => cmd::job::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
