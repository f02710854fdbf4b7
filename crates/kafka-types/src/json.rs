//! JSON rendering of decoded protobuf messages.
//!
//! Follows the proto3 JSON mapping closely enough for human consumption:
//! 64-bit integers become strings, bytes become standard base64, enums render
//! by name, and `google.protobuf.Timestamp` renders as an RFC 3339 string.

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{KafkaTypesError, Result};
use crate::proto::{ProtoFieldValue, ProtoMessage};

const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Convert a decoded message to a JSON object.
pub fn message_to_json(message: &ProtoMessage) -> Result<Value> {
    if message.message_type == TIMESTAMP_TYPE {
        return Ok(Value::String(timestamp_to_rfc3339(message)?));
    }

    let mut map = Map::new();
    for (name, value) in &message.fields {
        map.insert(name.clone(), value_to_json(value)?);
    }
    Ok(Value::Object(map))
}

/// Convert a single field value to JSON.
pub fn value_to_json(value: &ProtoFieldValue) -> Result<Value> {
    Ok(match value {
        ProtoFieldValue::Double(d) => float_to_json(*d),
        ProtoFieldValue::Float(f) => float_to_json(f64::from(*f)),
        ProtoFieldValue::Int32(i) => Value::from(*i),
        ProtoFieldValue::Uint32(u) => Value::from(*u),
        ProtoFieldValue::Int64(i) => Value::String(i.to_string()),
        ProtoFieldValue::Uint64(u) => Value::String(u.to_string()),
        ProtoFieldValue::Bool(b) => Value::Bool(*b),
        ProtoFieldValue::String(s) => Value::String(s.clone()),
        ProtoFieldValue::Bytes(b) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        ProtoFieldValue::Enum { name, number } => {
            if name.is_empty() {
                Value::from(*number)
            } else {
                Value::String(name.clone())
            }
        }
        ProtoFieldValue::Message(m) => message_to_json(m)?,
        ProtoFieldValue::Repeated(values) => Value::Array(
            values
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        ProtoFieldValue::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(map_key(key), value_to_json(value)?);
            }
            Value::Object(map)
        }
        ProtoFieldValue::Null => Value::Null,
    })
}

fn float_to_json(value: f64) -> Value {
    match Number::from_f64(value) {
        Some(n) => Value::Number(n),
        None if value.is_nan() => Value::String("NaN".to_string()),
        None if value.is_sign_positive() => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

fn map_key(key: &ProtoFieldValue) -> String {
    match key {
        ProtoFieldValue::String(s) => s.clone(),
        ProtoFieldValue::Int32(i) => i.to_string(),
        ProtoFieldValue::Int64(i) => i.to_string(),
        ProtoFieldValue::Uint32(u) => u.to_string(),
        ProtoFieldValue::Uint64(u) => u.to_string(),
        ProtoFieldValue::Bool(b) => b.to_string(),
        other => other.type_name(),
    }
}

/// Render a `google.protobuf.Timestamp` message as RFC 3339.
///
/// Missing `seconds`/`nanos` fields take their proto3 default of zero.
pub(crate) fn timestamp_to_rfc3339(message: &ProtoMessage) -> Result<String> {
    let seconds = match message.get("seconds") {
        Some(ProtoFieldValue::Int64(s)) => *s,
        Some(_) => return Err(KafkaTypesError::MissingField("seconds".to_string())),
        None => 0,
    };
    let nanos = match message.get("nanos") {
        Some(ProtoFieldValue::Int32(n)) => *n,
        Some(_) => return Err(KafkaTypesError::MissingField("nanos".to_string())),
        None => 0,
    };
    let dt = u32::try_from(nanos)
        .ok()
        .and_then(|n| DateTime::<Utc>::from_timestamp(seconds, n))
        .ok_or(KafkaTypesError::InvalidProtoTimestamp { seconds, nanos })?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
