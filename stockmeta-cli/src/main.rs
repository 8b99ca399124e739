use anyhow::Result;
use clap::Parser;
use stockmeta_cli::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A local .env may carry the fallback key and endpoint overrides.
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays usable for CSV and JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "stockmeta exited with error");
    }
    result
}
