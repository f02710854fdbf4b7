use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, ValueEnum};
use rdkafka::ClientConfig;
use std::path::PathBuf;
use std::time::Duration;

use checkpoint::{CheckpointIntent, OffsetStoreConfig};

use crate::codec::Format;
use crate::error::{Error, Result};

/// Configuration for the Kafka consumer.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(
        long,
        short = 'b',
        value_delimiter = ',',
        default_value = "localhost:9092",
        env = "PROTOTAIL_BROKERS"
    )]
    pub brokers: Vec<String>,

    /// Topic to consume, as `topic` or `topic=package.MessageType` (repeatable)
    #[arg(long, short = 't')]
    pub topic: Vec<String>,

    /// Message type of the topics given without one
    #[arg(long, short = 'm')]
    pub message_type: Option<String>,

    /// Root directory of the .proto files; imports resolve against it
    #[arg(long, short = 'r', env = "PROTOTAIL_PROTO_ROOT")]
    pub proto_root: PathBuf,

    /// Only parse these .proto files, relative to the proto root (repeatable)
    #[arg(long = "proto-file")]
    pub proto_files: Vec<PathBuf>,

    /// Environment the brokers belong to; stored offsets are kept per environment
    #[arg(long, short = 'E', default_value = "local", env = "PROTOTAIL_ENVIRONMENT")]
    pub environment: String,

    /// Start from the oldest available offset, ignoring stored offsets
    #[arg(long, conflicts_with_all = ["from_offset", "from_time"])]
    pub rewind: bool,

    /// Start every partition at this offset (-1: newest, -2: oldest)
    #[arg(long, allow_negative_numbers = true, conflicts_with = "from_time")]
    pub from_offset: Option<i64>,

    /// Start at the first message at or after this time
    /// (RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or epoch milliseconds)
    #[arg(long, value_parser = parse_time)]
    pub from_time: Option<DateTime<Utc>>,

    /// Only print messages whose output matches this regular expression
    #[arg(long, short = 'q')]
    pub search: Option<String>,

    /// Print messages that do NOT match the search query instead
    #[arg(long, requires = "search")]
    pub reverse: bool,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Prefix every message with its timestamp
    #[arg(long, short = 'T')]
    pub include_timestamp: bool,

    /// Write each topic to its own file in this directory; an empty value discards the output
    #[arg(long, short = 'd')]
    pub output_dir: Option<String>,

    /// Base directory of the stored offsets (default: ~/.prototail/offsets)
    #[arg(long, env = "PROTOTAIL_OFFSET_DIR")]
    pub offset_dir: Option<PathBuf>,

    /// Let the brokers create topics that don't exist yet
    #[arg(long)]
    pub auto_topic_creation: bool,

    /// Capacity of the channel between the consumer and the pipeline
    #[arg(long, default_value_t = 100)]
    pub channel_capacity: usize,

    /// How often stored offsets are flushed to disk, in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub offset_flush_interval_ms: u64,

    /// Timeout of metadata and offset lookups, in milliseconds
    #[arg(long, default_value_t = 10000)]
    pub request_timeout_ms: u64,

    #[command(flatten)]
    pub tls: TlsOptions,

    #[command(flatten)]
    pub sasl: SaslOptions,
}

/// TLS settings forwarded to librdkafka.
#[derive(Debug, Clone, Default, Args)]
pub struct TlsOptions {
    /// Connect to the brokers over TLS
    #[arg(long = "tls")]
    pub enabled: bool,

    /// CA certificate (PEM); without it the broker certificate is not verified
    #[arg(long = "tls-ca-cert")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate (PEM) for mutual authentication
    #[arg(long = "tls-client-cert", requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual authentication
    #[arg(long = "tls-client-key")]
    pub client_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaslMechanism {
    #[value(name = "plain")]
    Plain,
    #[value(name = "scram-sha-256")]
    ScramSha256,
    #[value(name = "scram-sha-512")]
    ScramSha512,
}

impl SaslMechanism {
    fn as_librdkafka(self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL settings forwarded to librdkafka.
#[derive(Debug, Clone, Default, Args)]
pub struct SaslOptions {
    /// SASL mechanism; enables SASL authentication
    #[arg(long = "sasl-mechanism", value_enum)]
    pub mechanism: Option<SaslMechanism>,

    #[arg(long = "sasl-username", env = "PROTOTAIL_SASL_USERNAME")]
    pub username: Option<String>,

    #[arg(
        long = "sasl-password",
        env = "PROTOTAIL_SASL_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,
}

impl Config {
    /// Check what clap can't.
    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(Error::Config("The environment cannot be empty.".to_string()));
        }
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("At least one broker is required.".to_string()));
        }
        if self.tls.client_cert.is_some() && self.tls.client_key.is_none() {
            return Err(Error::Config(
                "TLS client key is missing. Mutual authentication cannot be used".to_string(),
            ));
        }
        if self.sasl.mechanism.is_some() && self.sasl.username.is_none() {
            return Err(Error::Config(
                "A SASL username is required when a SASL mechanism is set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn checkpoint_intent(&self) -> CheckpointIntent {
        CheckpointIntent {
            rewind: self.rewind,
            offset: self.from_offset,
            timestamp: self.from_time,
        }
    }

    /// Directory holding the stored offsets of the configured environment.
    pub fn offset_path(&self) -> PathBuf {
        let base = self.offset_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".prototail")
                .join("offsets")
        });
        base.join(self.environment.trim())
    }

    pub fn offset_store_config(&self) -> OffsetStoreConfig {
        OffsetStoreConfig::new()
            .with_flush_interval(Duration::from_millis(self.offset_flush_interval_ms.max(1)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// librdkafka settings of the consumer.
    ///
    /// Offsets are never committed to the brokers; progress is kept by the
    /// local offset store.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("client.id", "prototail")
            .set("group.id", format!("prototail-{}", self.environment.trim()))
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set(
                "allow.auto.create.topics",
                if self.auto_topic_creation { "true" } else { "false" },
            );

        let sasl = self.sasl.mechanism.is_some();
        let protocol = match (self.tls.enabled, sasl) {
            (true, true) => "SASL_SSL",
            (true, false) => "SSL",
            (false, true) => "SASL_PLAINTEXT",
            (false, false) => "PLAINTEXT",
        };
        config.set("security.protocol", protocol);

        if self.tls.enabled {
            match &self.tls.ca_cert {
                Some(ca) => {
                    config.set("ssl.ca.location", ca.to_string_lossy());
                }
                None => {
                    config.set("enable.ssl.certificate.verification", "false");
                }
            }
            if let (Some(cert), Some(key)) = (&self.tls.client_cert, &self.tls.client_key) {
                config
                    .set("ssl.certificate.location", cert.to_string_lossy())
                    .set("ssl.key.location", key.to_string_lossy());
            }
        }

        if let Some(mechanism) = self.sasl.mechanism {
            config.set("sasl.mechanisms", mechanism.as_librdkafka());
            if let Some(username) = &self.sasl.username {
                config.set("sasl.username", username);
            }
            if let Some(password) = &self.sasl.password {
                config.set("sasl.password", password);
            }
        }

        config
    }
}

/// Parse `--from-time`.
pub fn parse_time(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(millis) = value.parse::<i64>() {
        if let Some(dt) = DateTime::<Utc>::from_timestamp_millis(millis) {
            return Ok(dt);
        }
    }
    Err(format!("invalid time '{value}'"))
}
