use anyhow::Result;
use cbrates::core::log::init_logging;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};

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

impl From<Commands> for cbrates::AppCommand {
    fn from(cmd: Commands) -> cbrates::AppCommand {
        match cmd {
            Commands::Rate { codes } => cbrates::AppCommand::Rate { codes },
            Commands::Rates { date } => cbrates::AppCommand::Rates { date },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show today's rate for one or more currency codes
    Rate {
        /// Currency codes, e.g. USD EUR
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Show all rates published for a date
    Rates {
        /// Date as YYYY-MM-DD, defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => cbrates::cli::setup::setup(),
        Some(cmd) => cbrates::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
