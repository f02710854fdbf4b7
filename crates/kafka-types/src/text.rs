//! Protobuf text format rendering.
//!
//! Produces the familiar `field: value` / `field { ... }` layout. With
//! `indent` every field goes on its own line and nested messages are indented
//! by two spaces; without it the whole message is a single line.

use crate::proto::{ProtoFieldValue, ProtoMessage};

/// Render a decoded message in protobuf text format.
pub fn message_to_text(message: &ProtoMessage, indent: bool) -> String {
    let mut out = TextWriter {
        buf: String::new(),
        indent,
        depth: 0,
    };
    out.message_body(message);
    if indent {
        out.buf.truncate(out.buf.trim_end().len());
    } else {
        out.buf = out.buf.trim().to_string();
    }
    out.buf
}

struct TextWriter {
    buf: String,
    indent: bool,
    depth: usize,
}

impl TextWriter {
    fn message_body(&mut self, message: &ProtoMessage) {
        for (name, value) in &message.fields {
            self.field(name, value);
        }
    }

    fn field(&mut self, name: &str, value: &ProtoFieldValue) {
        match value {
            ProtoFieldValue::Null => {}
            ProtoFieldValue::Repeated(values) => {
                for v in values {
                    self.field(name, v);
                }
            }
            ProtoFieldValue::Map(entries) => {
                for (key, value) in entries {
                    self.open(name);
                    self.field("key", key);
                    self.field("value", value);
                    self.close();
                }
            }
            ProtoFieldValue::Message(m) => {
                self.open(name);
                self.message_body(m);
                self.close();
            }
            scalar => {
                self.start_line();
                self.buf.push_str(name);
                self.buf.push_str(": ");
                self.buf.push_str(&scalar_to_text(scalar));
                self.end_line();
            }
        }
    }

    fn open(&mut self, name: &str) {
        self.start_line();
        self.buf.push_str(name);
        self.buf.push_str(" {");
        self.end_line();
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth -= 1;
        self.start_line();
        self.buf.push('}');
        self.end_line();
    }

    fn start_line(&mut self) {
        if self.indent {
            for _ in 0..self.depth {
                self.buf.push_str("  ");
            }
        }
    }

    fn end_line(&mut self) {
        self.buf.push(if self.indent { '\n' } else { ' ' });
    }
}

fn scalar_to_text(value: &ProtoFieldValue) -> String {
    match value {
        ProtoFieldValue::Double(d) => float_to_text(*d),
        ProtoFieldValue::Float(f) => float_to_text(f64::from(*f)),
        ProtoFieldValue::Int32(i) => i.to_string(),
        ProtoFieldValue::Int64(i) => i.to_string(),
        ProtoFieldValue::Uint32(u) => u.to_string(),
        ProtoFieldValue::Uint64(u) => u.to_string(),
        ProtoFieldValue::Bool(b) => b.to_string(),
        ProtoFieldValue::String(s) => quote(s.as_bytes()),
        ProtoFieldValue::Bytes(b) => quote(b),
        ProtoFieldValue::Enum { name, number } => {
            if name.is_empty() {
                number.to_string()
            } else {
                name.clone()
            }
        }
        other => other.type_name(),
    }
}

fn float_to_text(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

/// C-style quoting used by the text format; non-printable bytes are octal escaped.
fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out.push('"');
    out
}
