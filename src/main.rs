use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratekeeper::core::log::init_logging;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Serve exchange rates over HTTP and refresh them on a schedule
    Serve,
    /// Fetch and store one snapshot, then exit
    Refresh,
    /// Display the current rates for a base currency
    Rates {
        #[arg(short, long, default_value = "crypto")]
        base: String,
    },
    /// Display historical rates of one currency
    History {
        #[arg(short, long, default_value = "crypto")]
        base: String,
        #[arg(short, long)]
        target: String,
        /// Range start, epoch milliseconds
        #[arg(long)]
        start: i64,
        /// Range end, epoch milliseconds
        #[arg(long)]
        end: i64,
    },
}

impl From<Commands> for ratekeeper::AppCommand {
    fn from(cmd: Commands) -> ratekeeper::AppCommand {
        match cmd {
            Commands::Serve => ratekeeper::AppCommand::Serve,
            Commands::Refresh => ratekeeper::AppCommand::Refresh,
            Commands::Rates { base } => ratekeeper::AppCommand::Rates { base },
            Commands::History {
                base,
                target,
                start,
                end,
            } => ratekeeper::AppCommand::History {
                base,
                target,
                start,
                end,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // the server should report refresh failures even without --verbose
    let default_level = match cli.command {
        Some(Commands::Serve) => LevelFilter::INFO,
        _ => LevelFilter::OFF,
    };
    init_logging(cli.verbose, default_level);

    let result = match cli.command {
        Some(Commands::Setup) => ratekeeper::cli::setup::setup(),
        Some(cmd) => ratekeeper::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
