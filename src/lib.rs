//! prototail
//!
//! Tails Kafka topics carrying protobuf messages and prints them decoded,
//! remembering per partition how far it got so the next run can resume.
//!
//! # CLI Usage
//!
//! ```bash
//! # Resume where the last run of the "staging" environment stopped
//! prototail -b broker:9092 -E staging -r ./protos -t orders=shop.Order
//!
//! # Everything since a point in time, matching a pattern, as indented JSON
//! prototail -r ./protos -m shop.Payment -t payments \
//!   --from-time "2024-06-15 11:30:00" -q 'EUR' -f json-indent
//!
//! # Re-read two topics from the beginning into per-topic files
//! prototail -r ./protos -t orders=shop.Order -t payments=shop.Payment \
//!   --rewind -d ./out
//! ```

use anyhow::Context;
use checkpoint::LocalOffsetStore;
use clap::Parser;
use prototail_kafka_source::{
    Config, Filter, KafkaConsumer, Lifecycle, OutputTarget, ProtoCodec, ProtoRegistry,
    RunSummary, Sinks, Subscriptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prototail")]
#[command(about = "Tail Kafka topics carrying protobuf messages", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr; an empty value discards them
    #[arg(long, env = "PROTOTAIL_LOG_FILE")]
    pub log_file: Option<String>,
}

impl Cli {
    /// Log level for the configured verbosity, used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Install the global tracing subscriber.
///
/// Consumed messages go to stdout, so logs never do.
pub fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    let (writer, ansi) = match cli.log_file.as_deref().map(str::trim) {
        None => (BoxMakeWriter::new(std::io::stderr), true),
        Some("") => (BoxMakeWriter::new(std::io::sink), false),
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open the log file {path}"))?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Load every message type the subscriptions need.
fn load_registry(config: &Config, subscriptions: &Subscriptions) -> anyhow::Result<ProtoRegistry> {
    let mut registry = ProtoRegistry::from_dir(&config.proto_root, &config.proto_files)
        .with_context(|| {
            format!(
                "Failed to load the proto files under {}",
                config.proto_root.display()
            )
        })?;
    for subscription in subscriptions.iter() {
        registry.load(&subscription.message_type).with_context(|| {
            format!(
                "Failed to load message type {} for topic {}",
                subscription.message_type, subscription.topic
            )
        })?;
    }
    Ok(registry)
}

/// Build every component from `config` and consume until `shutdown` is
/// cancelled or the consumer stops.
pub async fn run(config: Config, shutdown: CancellationToken) -> anyhow::Result<RunSummary> {
    config.validate()?;

    let checkpoint = checkpoint::resolve(&config.checkpoint_intent());
    let subscriptions =
        Subscriptions::parse(&config.topic, config.message_type.as_deref(), &checkpoint)?;
    debug!(
        "Subscribed to {} topic(s), starting from {checkpoint}",
        subscriptions.len()
    );

    let registry = load_registry(&config, &subscriptions)?;
    let filter = Filter::from_query(config.search.as_deref(), config.reverse)
        .context("Invalid search expression")?;
    let sinks = Sinks::open(
        &OutputTarget::from_arg(config.output_dir.as_deref()),
        subscriptions.topics(),
    )?;

    let offset_path: PathBuf = config.offset_path();
    let store = LocalOffsetStore::open(&offset_path, config.offset_store_config())
        .with_context(|| format!("Failed to open the offset store at {}", offset_path.display()))?;
    info!("Offsets are stored under {}", offset_path.display());

    let (consumer, events) =
        KafkaConsumer::new(&config, store.handle()).context("Failed to create the consumer")?;
    let codec = ProtoCodec::new(registry, config.format, config.include_timestamp);

    Lifecycle::new(
        store,
        Arc::new(consumer),
        events,
        codec,
        subscriptions,
        filter,
        sinks,
    )
    .run(shutdown)
    .await
}
