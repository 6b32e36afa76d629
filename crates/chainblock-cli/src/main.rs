mod cmd;
mod output;
mod settings;
mod target;

use clap::{Parser, Subcommand};
use cmd::{
    blocklist::BlocklistSubcommand, config::ConfigSubcommand, run::RunArgs, user::UserSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "chainblock",
    about = "Block, mute or unblock everyone connected to an account or a tweet",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ~/.chainblock/config.yaml)
    #[arg(long, global = true, env = "CHAINBLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chain-block session and wait for it to finish
    Run(RunArgs),

    /// Act on a single user as the primary actor
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Inspect import files without touching the network
    Blocklist {
        #[command(subcommand)]
        subcommand: BlocklistSubcommand,
    },

    /// Show the primary actor's API rate limits
    Limits {
        /// Only endpoints whose path contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Create or validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = settings::resolve_config_path(cli.config.as_deref());

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(&config_path, args, cli.json),
        Commands::User { subcommand } => cmd::user::run(&config_path, subcommand, cli.json),
        Commands::Blocklist { subcommand } => {
            cmd::blocklist::run(&config_path, subcommand, cli.json)
        }
        Commands::Limits { filter } => cmd::limits::run(&config_path, filter.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
