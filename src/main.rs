use anyhow::Context;
use clap::{Parser, Subcommand};
use quarterdeck::config::AppConfig;
use quarterdeck::engine::TradeEngine;
use quarterdeck::exchange::binance::{ApiCredentials, BinanceRest};
use quarterdeck::inference::{ModelPredictor, Predictor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarterdeck", about = "Quarter-hour candle-boundary ML trading loop")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml", env = "QUARTERDECK_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision loop
    Run,
    /// Show the free balance of an asset
    Balance { asset: String },
    /// Show the last traded price of a symbol
    Ticker { symbol: String },
    /// Show the cached trading filters of a symbol
    Filters { symbol: String },
}

fn init_logging(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn build_exchange(config: &AppConfig) -> anyhow::Result<Arc<BinanceRest>> {
    let credentials = ApiCredentials::from_env(
        &config.exchange.api_key_env,
        &config.exchange.api_secret_env,
    )
    .context("exchange credentials")?;
    // In test mode orders go to the exchange's validate-only endpoint; the
    // simulated ledger handles the fills.
    let client = BinanceRest::new(
        &config.exchange.rest_url,
        credentials,
        config.exchange.recv_window_ms,
        config.trading.test_mode,
    )?;
    Ok(Arc::new(client))
}

fn load_predictors(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn Predictor>>> {
    config
        .instruments
        .iter()
        .map(|spec| {
            let predictor = ModelPredictor::load(&spec.name, &spec.model, &spec.scaler)
                .with_context(|| format!("loading model for {}", spec.name))?;
            Ok(Arc::new(predictor) as Arc<dyn Predictor>)
        })
        .collect()
}

async fn run_loop(config: AppConfig) -> anyhow::Result<()> {
    let exchange = build_exchange(&config)?;
    let predictors = load_predictors(&config)?;
    let mut engine = TradeEngine::new(&config, exchange, predictors).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Run => run_loop(config).await?,
        Commands::Balance { asset } => {
            let exchange = build_exchange(&config)?;
            use quarterdeck::exchange::ExchangeClient;
            let free = exchange.get_balance(&asset).await?;
            println!("{asset}: {free}");
        }
        Commands::Ticker { symbol } => {
            let exchange = build_exchange(&config)?;
            use quarterdeck::exchange::ExchangeClient;
            let price = exchange.last_price(&symbol).await?;
            println!("{symbol}: {price}");
        }
        Commands::Filters { symbol } => {
            let exchange = build_exchange(&config)?;
            use quarterdeck::exchange::ExchangeClient;
            let filters = exchange.symbol_filters(&symbol).await?;
            println!(
                "{symbol}: tick_size={} step_size={} min_notional={}",
                filters.tick_size, filters.step_size, filters.min_notional
            );
        }
    }

    Ok(())
}
