//! athena-datasource - runs Athena named queries for dashboards.

use std::sync::Arc;

use athena_datasource::athena::{HttpAthenaClient, HttpClientFactory};
use athena_datasource::cli::Cli;
use athena_datasource::config::Config;
use athena_datasource::credentials::DefaultCredentialsProvider;
use athena_datasource::datasource::Datasource;
use athena_datasource::error::{DatasourceError, Result};
use athena_datasource::logging;
use athena_datasource::query::{CacheStore, QueryDispatcher};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // CLI arguments take precedence over the config file, which takes
    // precedence over the environment.
    let mut settings = config.datasource.clone();
    settings.merge(&cli.to_datasource_config());
    settings.apply_env_defaults();
    settings.validate()?;
    info!("Datasource: {}", settings.display_string());

    let http = HttpAthenaClient::http_client()?;
    let mut credentials = DefaultCredentialsProvider::new(http.clone());
    if let Some(sts_endpoint) = &settings.sts_endpoint {
        credentials = credentials.with_sts_endpoint(sts_endpoint.clone());
    }
    let credentials = Arc::new(credentials);
    let factory = HttpClientFactory::new(http, credentials).with_endpoint(settings.endpoint.clone());
    let dispatcher = QueryDispatcher::new(
        Arc::new(CacheStore::new(config.engine.cache_ttl())),
        config.engine.poll_policy(),
    );
    let datasource = Datasource::new(Arc::new(factory), dispatcher);

    let request = cli.to_request(&settings)?;
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let response = datasource.query(&request, &cancel).await?;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    }
    .map_err(|e| DatasourceError::config(format!("Failed to encode response: {e}")))?;
    println!("{json}");
    Ok(())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted, cancelling query");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Ctrl+C handler installation failed"),
    }
}
