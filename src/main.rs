//! mqlink - queue client CLI
//!
//! Thin glue over the library: resolve configuration once, wire up the
//! loopback broker, run a producer or consumer, release resources in reverse
//! order, exit 0 on success and non-zero on any unrecovered fault.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use mqlink::client::{teardown, Connection, ConnectionProfile};
use mqlink::config::ClientConfig;
use mqlink::error::redact_credentials;
use mqlink::consumer::{shutdown_on_ctrl_c, ConsumerLoop, DrainPolicy};
use mqlink::message::{MessageEnvelope, OpenIntent, WaitMode};
use mqlink::observability::init_default_logging;
use mqlink::producer::{run_producer, ProducerSettings};
use mqlink::transport::{InMemoryBroker, MemoryTransport};

/// Minimal message-queue client
#[derive(Parser)]
#[command(name = "mqlink")]
#[command(about = "Minimal message-queue client: put and get against a broker queue")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put messages onto the configured queue
    Produce {
        /// Messages to send
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,

        /// Leading text of each payload
        #[arg(long, default_value = "msg")]
        text: String,

        /// Send as persistent (advisory to the broker)
        #[arg(short, long)]
        persistent: bool,

        /// Fixed inter-send delay in milliseconds (0 disables pacing)
        #[arg(long, default_value_t = 50)]
        pace_ms: u64,
    },
    /// Get messages from the configured queue
    Consume {
        /// Per-attempt wait timeout in milliseconds (0 = no wait, negative = wait forever)
        #[arg(long, default_value_t = 5000)]
        wait_ms: i64,

        /// Maximum messages to consume (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max: u64,

        /// Keep polling instead of stopping when the queue is empty
        #[arg(long)]
        forever: bool,

        /// Print envelope metadata as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    init_default_logging();

    let cli = Cli::parse();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Produce {
            count,
            text,
            persistent,
            pace_ms,
        } => {
            let settings = ProducerSettings {
                count,
                text,
                persistent,
                pace: Duration::from_millis(pace_ms),
            };
            produce(config, settings).await
        }
        Commands::Consume {
            wait_ms,
            max,
            forever,
            json,
        } => consume(config, wait_ms, max, forever, json).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", redact_credentials(&e.to_string()));
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations, fall back to env/defaults
            for path_str in ["mqlink.toml", "config/mqlink.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ClientConfig::load_from_file(&path)?);
                }
            }
            Ok(ClientConfig::from_env()?)
        }
    }
}

/// Build a connection against the in-process loopback broker.
///
/// Real brokers plug in behind `BrokerTransport`; the loopback broker
/// pre-declares the configured queue so the CLI is usable end to end.
async fn connect(config: &ClientConfig) -> Result<Connection<MemoryTransport>, Box<dyn std::error::Error>> {
    let profile = ConnectionProfile::from_config(config)?;
    let broker = InMemoryBroker::new().with_queue(&config.broker.queue);
    let transport = MemoryTransport::new(broker, profile.endpoint.clone(), config.credentials());
    Ok(Connection::establish(profile, transport).await?)
}

async fn produce(
    config: ClientConfig,
    settings: ProducerSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue_name = config.broker.queue.clone();
    let connection = connect(&config).await?;
    let queue = connection.open(&queue_name, OpenIntent::Write).await?;

    let result = run_producer(&queue, &settings).await;
    teardown(&queue, &connection).await;

    let report = result?;
    for id in &report.sent {
        println!("PUT: {}", id.as_hex());
    }
    info!(sent = report.sent.len(), "producer finished");
    Ok(())
}

async fn consume(
    config: ClientConfig,
    wait_ms: i64,
    max: u64,
    forever: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue_name = config.broker.queue.clone();
    let connection = connect(&config).await?;
    let queue = connection.open(&queue_name, OpenIntent::Read).await?;

    let policy = if forever {
        DrainPolicy::PollForever
    } else {
        DrainPolicy::StopOnEmpty
    };
    info!(queue = %queue_name, wait_ms, ?policy, "waiting for messages");

    let (delivered_tx, mut delivered_rx) = mpsc::channel::<MessageEnvelope>(64);
    let printer = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(envelope) = delivered_rx.recv().await {
            count += 1;
            if json {
                println!("{}", render_json(count, &envelope));
            } else {
                println!("[{count}] {}", envelope.text());
            }
        }
    });

    let shutdown = shutdown_on_ctrl_c();
    let mut consumer =
        ConsumerLoop::new(policy, WaitMode::from_millis(wait_ms)).with_message_cap(max);
    let summary = consumer
        .run_then_release(&queue, &connection, delivered_tx, shutdown)
        .await?;

    // sender side is gone after the run, so the printer drains and exits
    printer.await?;
    info!(received = summary.received, cause = ?summary.cause, "consumer finished");
    Ok(())
}

fn render_json(seq: u64, envelope: &MessageEnvelope) -> String {
    serde_json::json!({
        "seq": seq,
        "id": envelope.id.as_hex(),
        "persistent": envelope.persistent,
        "enqueued_at": envelope.enqueued_at.to_rfc3339(),
        "text": envelope.text(),
    })
    .to_string()
}

fn handle_config_command(
    config: ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // endpoint syntax is the part that can silently rot in a config file
    config.validate()?;
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    info!("Configuration is valid");
    Ok(())
}
