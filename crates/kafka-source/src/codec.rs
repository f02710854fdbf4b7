//! Decoding consumed payloads and marshalling them for output.

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use kafka_types::{message_to_json, message_to_text, ProtoMessage};

use crate::error::Result;
use crate::proto::{decode, ProtoRegistry};

/// Turns raw payloads into printable output.
///
/// The pipeline holds one codec for the whole run and calls it for every
/// event; implementations must not keep per-event state.
pub trait Codec: Send + Sync + 'static {
    type Message;

    /// Decode `bytes` as an instance of `message_type`.
    fn decode(&self, message_type: &str, bytes: &[u8]) -> Result<Self::Message>;

    /// Render a decoded message, stamped with the event's timestamp.
    fn marshal(&self, message: &Self::Message, timestamp: DateTime<Utc>) -> Result<Vec<u8>>;
}

/// Output encoding of decoded messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Single-line JSON
    #[default]
    Json,
    /// Pretty-printed JSON
    JsonIndent,
    /// Single-line protobuf text format
    Text,
    /// Multi-line protobuf text format
    TextIndent,
    /// Upper-case hex of the encoded payload
    Hex,
    /// Upper-case hex, one space between bytes
    HexIndent,
}

/// A payload that decoded successfully, with the bytes it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub message: ProtoMessage,
    pub raw: Vec<u8>,
}

/// [`Codec`] backed by `.proto` files parsed at runtime.
#[derive(Debug)]
pub struct ProtoCodec {
    registry: ProtoRegistry,
    format: Format,
    include_timestamp: bool,
}

impl ProtoCodec {
    /// Every message type the codec will be asked for must already be
    /// loaded into `registry`.
    pub fn new(registry: ProtoRegistry, format: Format, include_timestamp: bool) -> Self {
        Self {
            registry,
            format,
            include_timestamp,
        }
    }
}

impl Codec for ProtoCodec {
    type Message = Decoded;

    fn decode(&self, message_type: &str, bytes: &[u8]) -> Result<Decoded> {
        let descriptor = self.registry.get(message_type)?;
        Ok(Decoded {
            message: decode(descriptor, bytes)?,
            raw: bytes.to_vec(),
        })
    }

    fn marshal(&self, message: &Decoded, timestamp: DateTime<Utc>) -> Result<Vec<u8>> {
        let body = render(self.format, message)?;
        if !self.include_timestamp {
            return Ok(body);
        }
        let mut out = format!(
            "[{}]\n",
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
        .into_bytes();
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn render(format: Format, decoded: &Decoded) -> Result<Vec<u8>> {
    Ok(match format {
        Format::Json => serde_json::to_vec(&message_to_json(&decoded.message)?)?,
        Format::JsonIndent => serde_json::to_vec_pretty(&message_to_json(&decoded.message)?)?,
        Format::Text => message_to_text(&decoded.message, false).into_bytes(),
        Format::TextIndent => message_to_text(&decoded.message, true).into_bytes(),
        Format::Hex => hex::encode_upper(&decoded.raw).into_bytes(),
        Format::HexIndent => decoded
            .raw
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
            .into_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use protobuf::MessageDyn;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package shop;
        message Order {
            string status = 1;
            int32 qty = 2;
        }
    "#;

    fn codec(format: Format, include_timestamp: bool) -> ProtoCodec {
        let mut registry = ProtoRegistry::from_string(SCHEMA).unwrap();
        registry.load("shop.Order").unwrap();
        ProtoCodec::new(registry, format, include_timestamp)
    }

    fn order_bytes(codec: &ProtoCodec) -> Vec<u8> {
        let descriptor = codec.registry.get("shop.Order").unwrap();
        let mut message = descriptor.new_instance();
        let fields = message.descriptor_dyn();
        fields
            .field_by_name("status")
            .unwrap()
            .set_singular_field(&mut *message, "ok".to_string().into());
        fields
            .field_by_name("qty")
            .unwrap()
            .set_singular_field(&mut *message, 3i32.into());
        message.write_to_bytes_dyn().unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 11, 30, 45).unwrap()
    }

    #[test]
    fn test_marshal_json() {
        let codec = codec(Format::Json, false);
        let decoded = codec.decode("shop.Order", &order_bytes(&codec)).unwrap();
        let out = codec.marshal(&decoded, ts()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"{"qty":3,"status":"ok"}"#
        );
    }

    #[test]
    fn test_marshal_with_timestamp_prefix() {
        let codec = codec(Format::Json, true);
        let decoded = codec.decode("shop.Order", &order_bytes(&codec)).unwrap();
        let out = String::from_utf8(codec.marshal(&decoded, ts()).unwrap()).unwrap();
        assert!(out.starts_with("[2024-06-15T11:30:45.000Z]\n{"));
    }

    #[test]
    fn test_marshal_hex() {
        let codec = codec(Format::Hex, false);
        let bytes = order_bytes(&codec);
        let decoded = codec.decode("shop.Order", &bytes).unwrap();
        // status = "ok" (field 1), qty = 3 (field 2)
        assert_eq!(
            codec.marshal(&decoded, ts()).unwrap(),
            b"0A026F6B1003".to_vec()
        );

        let codec = ProtoCodec::new(codec.registry, Format::HexIndent, false);
        assert_eq!(
            codec.marshal(&decoded, ts()).unwrap(),
            b"0A 02 6F 6B 10 03".to_vec()
        );
    }

    #[test]
    fn test_marshal_text() {
        let codec = codec(Format::Text, false);
        let decoded = codec.decode("shop.Order", &order_bytes(&codec)).unwrap();
        let out = String::from_utf8(codec.marshal(&decoded, ts()).unwrap()).unwrap();
        assert!(out.contains("status: \"ok\""));
        assert!(out.contains("qty: 3"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn test_decode_unknown_type() {
        let codec = codec(Format::Json, false);
        assert!(codec.decode("shop.Refund", &[]).is_err());
    }
}
