use clap::{Parser, Subcommand};
use logpull::cli::run::FetchArgs;
use logpull::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logpull")]
#[command(about = "Download service logs from a paginated log API", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download logs for one service into a local text file
    Fetch {
        /// Service to download logs for
        #[arg(long)]
        service_id: String,

        /// API token, with or without the "Bearer " prefix
        #[arg(long)]
        auth_token: Option<String>,

        /// Day to download in YYYYMMDD format (UTC)
        #[arg(long, conflicts_with = "hours")]
        date: Option<String>,

        /// Rolling window length when no date is given
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Output file (defaults to <YYYYMMDD>_render_logs.txt)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the sample config to ~/.config/logpull/config.yml
    Init {
        #[arg(long)]
        stdout: bool,
    },
    /// Load and validate the config
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logpull=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Fetch {
            service_id,
            auth_token,
            date,
            hours,
            output,
        } => {
            let args = FetchArgs {
                service_id,
                auth_token,
                date,
                hours,
                output,
            };
            let outcome = logpull::cli::run::run(config_path, args).await?;
            if !outcome.is_exhausted() {
                std::process::exit(1);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => {
                logpull::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                logpull::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
