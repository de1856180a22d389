use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zcpublish_announce::{
    DirectoryConnector, EndpointEvent, EndpointTable, MdnsConnector, Publisher, Simulator,
};
use zcpublish_core::config::{AppConfig, LogFormat, LoggingConfig};

/// zcpublish - announces a sound server and its sinks and sources via Zeroconf
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ZCPUBLISH_CONFIG", default_value = "config/zcpublish.yaml")]
    config: PathBuf,

    /// Override the announced port
    #[arg(short, long)]
    port: Option<u32>,

    /// Directory backend
    #[arg(long, value_enum, default_value_t = Backend::Mdns)]
    backend: Backend,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Multicast DNS on the local network
    Mdns,
    /// In-memory directory, announces nothing on the network
    Simulator,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::from_config_builder(&args.config)
        .with_context(|| format!("Failed to load config file: {:?}", args.config))?;

    if let Some(port) = args.port {
        config.publish.port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let level = logging.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// Re-reads the endpoint list on every SIGHUP and forwards the difference.
#[cfg(unix)]
async fn reload_on_hangup(
    path: PathBuf,
    table: Arc<EndpointTable>,
    events: mpsc::UnboundedSender<EndpointEvent>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    while hangup.recv().await.is_some() {
        info!(config = ?path, "Reloading endpoints");
        match reload_endpoints(&path, &table) {
            Ok(changes) => {
                for event in changes {
                    if events.send(event).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(e) => error!("Reload failed, keeping current endpoints: {:#}", e),
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn reload_on_hangup(
    _path: PathBuf,
    _table: Arc<EndpointTable>,
    _events: mpsc::UnboundedSender<EndpointEvent>,
) -> Result<()> {
    std::future::pending().await
}

fn reload_endpoints(path: &Path, table: &EndpointTable) -> Result<Vec<EndpointEvent>> {
    let config = AppConfig::from_config_builder(path)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;
    config.validate().context("Invalid configuration")?;
    Ok(table.sync(config.endpoints()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(&args)?;
    init_logging(&config.logging)?;

    info!("Starting zcpublish");
    info!("Configuration loaded from {:?}", args.config);

    let table = Arc::new(EndpointTable::from_endpoints(config.endpoints()));
    info!(endpoints = table.len(), "Endpoints loaded");

    let connector: Box<dyn DirectoryConnector> = match args.backend {
        Backend::Mdns => Box::new(MdnsConnector::from_config(&config.publish)),
        Backend::Simulator => {
            warn!("Using the simulator backend, nothing is announced on the network");
            Simulator::new().connector()
        }
    };

    let mut publisher = Publisher::initialize(&config.publish, connector, table.clone())
        .context("Failed to initialize publisher")?;

    let (endpoint_tx, endpoint_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let reload = {
        let path = args.config.clone();
        let table = table.clone();
        tokio::spawn(async move {
            if let Err(e) = reload_on_hangup(path, table, endpoint_tx).await {
                error!("Config reload disabled: {:#}", e);
            }
        })
    };

    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal, withdrawing services..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            shutdown.cancel();
        })
    };

    publisher.run(endpoint_rx, shutdown).await;

    reload.abort();
    ctrl_c.abort();
    publisher.teardown();

    info!("zcpublish stopped");
    Ok(())
}
