//! Market tape terminal entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Market price and news tape
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TAPE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before any wss:// connection
    tape_ws::init_crypto();

    let args = Args::parse();
    let config = tape_app::AppConfig::load(args.config.as_deref())?;

    tape_telemetry::init_logging(Some(&config.telemetry.log_level))?;
    info!("Starting tape v{}", env!("CARGO_PKG_VERSION"));
    info!(
        news_sources = config.news.sources.len(),
        symbol = %config.chart.symbol,
        interval = %config.chart.interval,
        "Configuration loaded"
    );

    let mut app = tape_app::Application::new(config)?;
    app.load_futures_symbols().await;
    app.run().await?;

    Ok(())
}
