// src/main.rs
//! Ice-Phishing Monitor Entry Point
//! Follows a chain over JSON-RPC and reports approval/transfer correlation alerts.
use anyhow::Result;
use clap::{Parser, Subcommand};
use ice_phishing_detector::blockchain::{etherscan::create_etherscan_client, EthereumClient};
use ice_phishing_detector::ice_phishing::{
    AlertBus, CorrelationEngine, LoggingSubscriber, MonitorConfig, StatisticsSubscriber,
};
use ice_phishing_detector::monitoring::DetectorMetrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "ice_phishing_monitor")]
#[command(about = "Ice-phishing approval/transfer correlation monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the chain and report alerts
    Run {
        /// Config file (.toml or .json); defaults plus environment when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the RPC endpoint from the config file
        #[arg(long)]
        rpc_url: Option<String>,
        /// Override the first block to process
        #[arg(long)]
        start_block: Option<u64>,
    },
    /// Load and validate a config file, then print it as JSON
    CheckConfig {
        /// Config file (.toml or .json)
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging()?;

    match args.command {
        Commands::CheckConfig { config } => check_config(&config),
        Commands::Run { config, rpc_url, start_block } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(url) = rpc_url {
                config.rpc_url = url;
            }
            if start_block.is_some() {
                config.start_block = start_block;
            }
            config.validate()?;
            run(config).await
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    let config = match path {
        Some(path) => MonitorConfig::from_file(path)?,
        None => {
            let mut config = MonitorConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };
    Ok(config)
}

fn check_config(path: &Path) -> Result<()> {
    let config = MonitorConfig::from_file(path)?;
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    info!("✅ {} is valid", path.display());
    Ok(())
}

async fn run(config: MonitorConfig) -> Result<()> {
    info!("Starting Ice-Phishing Monitor v{}", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(EthereumClient::new(&config.rpc_url).await?);
    let verifier = Arc::new(create_etherscan_client(&config.etherscan_network));
    let metrics = Arc::new(DetectorMetrics::new()?);

    let engine = CorrelationEngine::new(config.detector.clone(), client.clone(), verifier)?
        .with_metrics(metrics.clone());

    let bus = AlertBus::new(config.alert_buffer_size);
    bus.subscribe(Arc::new(LoggingSubscriber::new("log")));
    let stats = Arc::new(StatisticsSubscriber::new("stats"));
    bus.subscribe(stats.clone());

    let mut next_block = match config.start_block {
        Some(block) => block,
        None => client.block_number().await?,
    };
    info!(network = client.network_name(), start_block = next_block, "🔭 Following chain");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = tokio::time::sleep(config.poll_interval()) => {}
        }

        let head = match client.block_number().await {
            Ok(head) => head,
            Err(e) if e.is_critical() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Failed to fetch chain head, retrying next poll");
                continue;
            }
        };

        while next_block <= head {
            let (block, transactions) = match client.fetch_block_events(next_block).await {
                Ok(events) => events,
                Err(e) if e.is_recoverable() => {
                    warn!(
                        block = next_block,
                        error = %e,
                        "Failed to fetch block, retrying next poll"
                    );
                    break;
                }
                Err(e) => {
                    error!(
                        block = next_block,
                        error = %e,
                        "Failed to fetch block, stopping monitor"
                    );
                    return Err(e.into());
                }
            };

            for tx in &transactions {
                let alerts = engine.on_transaction(tx).await;
                bus.publish_all(alerts, block.number);
            }
            bus.publish_all(engine.on_block(&block).await, block.number);

            debug!(block = block.number, transactions = transactions.len(), "Block processed");
            next_block += 1;
        }
    }

    let summary = stats.get_statistics();
    info!(
        total_alerts = summary.total_alerts,
        exploits = summary.exploits,
        tracked_spenders = engine.store().len(),
        "Monitor stopped"
    );
    debug!("{}", metrics.export_metrics()?);
    Ok(())
}
