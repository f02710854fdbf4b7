//! Protobuf schema loading and decoding.
//!
//! This module provides:
//! - A registry of message descriptors parsed at runtime from `.proto` files
//! - Decoding of encoded messages into the kafka-types value model
//!
//! The value model (ProtoMessage, ProtoFieldValue) is in kafka-types.

pub mod decoder;
pub mod registry;

pub use decoder::decode;
pub use registry::ProtoRegistry;
