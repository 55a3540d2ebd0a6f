use clap::{Parser, Subcommand};
use stillpoint_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stillpoint", version, about = "Stillpoint CLI")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Guarded app management
    Apps {
        #[command(subcommand)]
        action: commands::apps::AppsAction,
    },
    /// Schedule and commitment settings
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Pause all interventions for a while
    Snooze {
        #[command(subcommand)]
        action: commands::snooze::SnoozeAction,
    },
    /// Intervention log and statistics
    Log {
        #[command(subcommand)]
        action: commands::log::LogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Drive the guard engine interactively from stdin
    Simulate,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("STILLPOINT_LOG").unwrap_or_else(|_| {
            let level = Config::load_or_default().logging.level;
            EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Apps { action } => commands::apps::run(action),
        Commands::Settings { action } => commands::settings::run(action),
        Commands::Snooze { action } => commands::snooze::run(action),
        Commands::Log { action } => commands::log::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Simulate => commands::simulate::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
