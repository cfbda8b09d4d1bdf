use crate::cli::window::{WindowError, WindowSpec};
use crate::config::{load_config_or_default, ConfigError};
use crate::fetch::{
    FetchError, FetchOutcome, FetchSettings, GraphqlLogClient, LogFilter, PaginatedLogFetcher,
};
use crate::sink::{FileSink, SinkError};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Window(#[from] WindowError),

    #[error("no auth token: pass --auth-token or set api.auth_token in the config")]
    MissingToken,

    #[error("client error: {0}")]
    Client(#[from] FetchError),

    #[error("output error: {0}")]
    Sink(#[from] SinkError),
}

/// Arguments of `logpull fetch`.
#[derive(Debug, Clone)]
pub struct FetchArgs {
    pub service_id: String,
    pub auth_token: Option<String>,
    pub date: Option<String>,
    pub hours: u32,
    pub output: Option<PathBuf>,
}

/// Runs one fetch session and reports the outcome on stdout.
///
/// A failed session still returns `Ok`; only setup problems are errors.
pub async fn run(config_path: Option<PathBuf>, args: FetchArgs) -> Result<FetchOutcome, RunError> {
    let config = load_config_or_default(config_path.as_deref())?;

    let token = args
        .auth_token
        .clone()
        .or_else(|| config.api.auth_token.clone())
        .ok_or(RunError::MissingToken)?;

    let now = Utc::now();
    let spec = WindowSpec::from_args(args.date.as_deref(), args.hours)?;
    let window = spec.resolve(now)?;
    let output = args.output.clone().unwrap_or_else(|| {
        config
            .output
            .directory
            .join(spec.file_name(now, &config.output.file_suffix))
    });

    info!(
        endpoint = %config.api.endpoint,
        service_id = %args.service_id,
        output = %output.display(),
        "Preparing log download"
    );

    let client = GraphqlLogClient::new(&config.api, &token)?;
    let fetcher = PaginatedLogFetcher::new(Arc::new(client), FetchSettings::from(&config));
    let filter = LogFilter::for_service(args.service_id.clone(), &config.query.log_types);
    let mut sink = FileSink::open(&output)?;

    println!("Downloading logs for {} to {}", spec.describe(), output.display());

    let outcome = fetcher.fetch(&window, &filter, &mut sink).await;

    println!(
        "Fetched {} logs in {} pages ({})",
        outcome.total_records_written, outcome.pages_fetched, outcome.termination
    );
    if outcome.is_exhausted() {
        println!("Download complete!");
    }

    Ok(outcome)
}
