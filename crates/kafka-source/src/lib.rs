//! Kafka consumer pipeline for prototail.
//!
//! This crate provides:
//! - [`KafkaConsumer`], an rdkafka consumer assigning every partition of the
//!   subscribed topics at the offset their checkpoint resolves to
//! - [`ProtoCodec`], runtime protobuf decoding and output rendering
//! - [`Pipeline`], the cancellable consume → decode → filter → emit loop
//! - [`Lifecycle`], which starts everything and shuts it down in order
//!
//! # Dependency Direction
//!
//! This crate depends on `kafka-types` for the event and decoded value types
//! and on `checkpoint` for checkpoint resolution and the local offset store.
//! Neither depends on this crate.

pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod pipeline;
pub mod proto;
pub mod sink;
pub mod source;
pub mod subscription;

pub use kafka_types::{Event, ProtoFieldValue, ProtoMessage};

pub use codec::{Codec, Decoded, Format, ProtoCodec};
pub use config::{parse_time, Config, SaslMechanism, SaslOptions, TlsOptions};
pub use consumer::KafkaConsumer;
pub use error::{Error, Result};
pub use filter::Filter;
pub use lifecycle::{Lifecycle, RunSummary};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport};
pub use proto::ProtoRegistry;
pub use sink::{OutputTarget, Sink, Sinks};
pub use source::EventSource;
pub use subscription::{Subscriptions, TopicSubscription};
