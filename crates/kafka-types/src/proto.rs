//! Protobuf value model.
//!
//! The runtime representation of a decoded protobuf message. The decoder in
//! the kafka source crate walks a dynamic message and produces these values;
//! the `json` and `text` modules render them for output.

/// Represents a field value in a decoded protobuf message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoFieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Enum value; `name` is empty when the number is not declared in the schema
    Enum { name: String, number: i32 },
    Message(Box<ProtoMessage>),
    Repeated(Vec<ProtoFieldValue>),
    /// Map entries in wire order
    Map(Vec<(ProtoFieldValue, ProtoFieldValue)>),
    Null,
}

impl ProtoFieldValue {
    /// Get the human-readable type name.
    pub fn type_name(&self) -> String {
        match self {
            ProtoFieldValue::Double(_) => "double".to_string(),
            ProtoFieldValue::Float(_) => "float".to_string(),
            ProtoFieldValue::Int32(_) => "int32".to_string(),
            ProtoFieldValue::Int64(_) => "int64".to_string(),
            ProtoFieldValue::Uint32(_) => "uint32".to_string(),
            ProtoFieldValue::Uint64(_) => "uint64".to_string(),
            ProtoFieldValue::Bool(_) => "bool".to_string(),
            ProtoFieldValue::String(_) => "string".to_string(),
            ProtoFieldValue::Bytes(_) => "bytes".to_string(),
            ProtoFieldValue::Enum { .. } => "enum".to_string(),
            ProtoFieldValue::Message(msg) => format!("message:{}", msg.message_type),
            ProtoFieldValue::Repeated(_) => "repeated".to_string(),
            ProtoFieldValue::Map(_) => "map".to_string(),
            ProtoFieldValue::Null => "null".to_string(),
        }
    }
}

/// Represents a decoded protobuf message.
///
/// Fields are kept in schema definition order so rendered output is stable.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoMessage {
    /// Fully qualified message type name (e.g., "mypackage.MyMessage")
    pub message_type: String,
    /// Decoded field values, in definition order
    pub fields: Vec<(String, ProtoFieldValue)>,
}

impl ProtoMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: ProtoFieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&ProtoFieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}
