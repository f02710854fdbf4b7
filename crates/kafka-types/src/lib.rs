//! Shared types for prototail.
//!
//! This crate holds the data that flows between the broker client, the codec
//! and the event processing pipeline:
//!
//! - [`Event`] - one consumed message with its position in the log
//! - [`ProtoMessage`] / [`ProtoFieldValue`] - the runtime representation of a
//!   decoded protobuf message
//!
//! # Rendering
//!
//! ```text
//! encoded bytes → ProtoMessage → serde_json::Value  (json module)
//!                              → protobuf text format (text module)
//! ```
//!
//! Decoding itself lives in the kafka source crate, next to the descriptor
//! registry; this crate has no protobuf dependency.

pub mod error;
pub mod json;
pub mod message;
pub mod proto;
pub mod text;

pub use error::{KafkaTypesError, Result};
pub use json::{message_to_json, value_to_json};
pub use message::Event;
pub use proto::{ProtoFieldValue, ProtoMessage};
pub use text::message_to_text;
