use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use exrates::core::log::init_logging;

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
    /// Fetch EUR/USD rates for the last DAYS days (1-10) and print them
    Fetch {
        /// Number of days, including today
        #[arg(allow_hyphen_values = true)]
        days: String,
        /// Render as a table instead of JSON
        #[arg(short, long)]
        table: bool,
    },
    /// Serve the `exchange <N>` command protocol over TCP
    Serve {
        /// Address to bind, overrides the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl From<Commands> for exrates::AppCommand {
    fn from(cmd: Commands) -> exrates::AppCommand {
        match cmd {
            Commands::Fetch { days, table } => exrates::AppCommand::Fetch { days, table },
            Commands::Serve { host, port } => exrates::AppCommand::Serve { host, port },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => exrates::cli::setup::setup(),
        Some(cmd) => exrates::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
