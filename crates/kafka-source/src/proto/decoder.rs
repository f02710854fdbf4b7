//! Dynamic decoding of protobuf payloads.

use crate::error::Result;
use kafka_types::{ProtoFieldValue, ProtoMessage};
use protobuf::reflect::{MessageDescriptor, ReflectFieldRef, ReflectValueRef};
use protobuf::MessageDyn;

/// Decode `bytes` as a message of type `descriptor`.
///
/// Only fields present on the wire are kept, so proto3 fields holding their
/// default value and empty repeated or map fields are omitted.
pub fn decode(descriptor: &MessageDescriptor, bytes: &[u8]) -> Result<ProtoMessage> {
    let message = descriptor.parse_from_bytes(bytes)?;
    Ok(to_proto_message(&*message))
}

fn to_proto_message(message: &dyn MessageDyn) -> ProtoMessage {
    let descriptor = message.descriptor_dyn();
    let mut out = ProtoMessage::new(descriptor.full_name());

    for field in descriptor.fields() {
        let value = match field.get_reflect(message) {
            ReflectFieldRef::Optional(optional) => match optional.value() {
                Some(value) => to_field_value(value),
                None => continue,
            },
            ReflectFieldRef::Repeated(repeated) => {
                if repeated.is_empty() {
                    continue;
                }
                ProtoFieldValue::Repeated(
                    (0..repeated.len())
                        .map(|i| to_field_value(repeated.get(i)))
                        .collect(),
                )
            }
            ReflectFieldRef::Map(map) => {
                if map.is_empty() {
                    continue;
                }
                let mut entries: Vec<(ProtoFieldValue, ProtoFieldValue)> = (&map)
                    .into_iter()
                    .map(|(k, v)| (to_field_value(k), to_field_value(v)))
                    .collect();
                // Map iteration order is unspecified; keep output stable.
                entries.sort_by_key(|(k, _)| map_key_order(k));
                ProtoFieldValue::Map(entries)
            }
        };
        out.fields.push((field.name().to_string(), value));
    }

    out
}

fn to_field_value(value: ReflectValueRef<'_>) -> ProtoFieldValue {
    match value {
        ReflectValueRef::U32(v) => ProtoFieldValue::Uint32(v),
        ReflectValueRef::U64(v) => ProtoFieldValue::Uint64(v),
        ReflectValueRef::I32(v) => ProtoFieldValue::Int32(v),
        ReflectValueRef::I64(v) => ProtoFieldValue::Int64(v),
        ReflectValueRef::F32(v) => ProtoFieldValue::Float(v),
        ReflectValueRef::F64(v) => ProtoFieldValue::Double(v),
        ReflectValueRef::Bool(v) => ProtoFieldValue::Bool(v),
        ReflectValueRef::String(v) => ProtoFieldValue::String(v.to_string()),
        ReflectValueRef::Bytes(v) => ProtoFieldValue::Bytes(v.to_vec()),
        ReflectValueRef::Enum(descriptor, number) => ProtoFieldValue::Enum {
            name: descriptor
                .value_by_number(number)
                .map(|v| v.name().to_string())
                .unwrap_or_default(),
            number,
        },
        ReflectValueRef::Message(message) => {
            ProtoFieldValue::Message(Box::new(to_proto_message(&*message)))
        }
    }
}

/// Sort key for map keys: integers numerically, then bools, then strings.
fn map_key_order(key: &ProtoFieldValue) -> (u8, i128, String) {
    match key {
        ProtoFieldValue::Int32(v) => (0, i128::from(*v), String::new()),
        ProtoFieldValue::Int64(v) => (0, i128::from(*v), String::new()),
        ProtoFieldValue::Uint32(v) => (0, i128::from(*v), String::new()),
        ProtoFieldValue::Uint64(v) => (0, i128::from(*v), String::new()),
        ProtoFieldValue::Bool(v) => (1, i128::from(*v), String::new()),
        ProtoFieldValue::String(v) => (2, 0, v.clone()),
        _ => (3, 0, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ProtoRegistry;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package shop;

        enum Status {
            UNKNOWN = 0;
            PAID = 1;
        }

        message Customer {
            string name = 1;
        }

        message Order {
            string id = 1;
            int64 amount = 2;
            Status status = 3;
            Customer customer = 4;
            repeated string tags = 5;
            map<string, int32> counts = 6;
            bytes blob = 7;
        }
    "#;

    fn order_descriptor() -> MessageDescriptor {
        let mut registry = ProtoRegistry::from_string(SCHEMA).unwrap();
        registry.load("shop.Order").unwrap();
        registry.get("shop.Order").unwrap().clone()
    }

    fn encode(descriptor: &MessageDescriptor, fill: impl FnOnce(&mut dyn MessageDyn)) -> Vec<u8> {
        let mut message = descriptor.new_instance();
        fill(&mut *message);
        message.write_to_bytes_dyn().unwrap()
    }

    #[test]
    fn test_decode_all_field_kinds() {
        let descriptor = order_descriptor();
        let bytes = encode(&descriptor, |m| {
            let d = m.descriptor_dyn();
            d.field_by_name("id").unwrap().set_singular_field(m, "o-1".to_string().into());
            d.field_by_name("amount").unwrap().set_singular_field(m, 250i64.into());
            let status = d.field_by_name("status").unwrap();
            let status_enum = match status.runtime_field_type() {
                protobuf::reflect::RuntimeFieldType::Singular(
                    protobuf::reflect::RuntimeType::Enum(e),
                ) => e,
                _ => panic!("status is not an enum field"),
            };
            status.set_singular_field(
                m,
                protobuf::reflect::ReflectValueBox::Enum(status_enum, 1),
            );
            let tags = d.field_by_name("tags").unwrap();
            let mut repeated = tags.mut_repeated(m);
            repeated.push("a".to_string().into());
            repeated.push("b".to_string().into());
        });

        let decoded = decode(&descriptor, &bytes).unwrap();
        assert_eq!(decoded.message_type, "shop.Order");
        assert_eq!(
            decoded.get("id"),
            Some(&ProtoFieldValue::String("o-1".to_string()))
        );
        assert_eq!(decoded.get("amount"), Some(&ProtoFieldValue::Int64(250)));
        assert_eq!(
            decoded.get("status"),
            Some(&ProtoFieldValue::Enum {
                name: "PAID".to_string(),
                number: 1
            })
        );
        assert_eq!(
            decoded.get("tags"),
            Some(&ProtoFieldValue::Repeated(vec![
                ProtoFieldValue::String("a".to_string()),
                ProtoFieldValue::String("b".to_string()),
            ]))
        );

        // Unset fields are omitted
        assert!(decoded.get("customer").is_none());
        assert!(decoded.get("counts").is_none());
        assert!(decoded.get("blob").is_none());
    }

    #[test]
    fn test_decode_empty_payload() {
        let descriptor = order_descriptor();
        let decoded = decode(&descriptor, &[]).unwrap();
        assert!(decoded.fields.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let descriptor = order_descriptor();
        // Field 1, length-delimited, claims 100 bytes but carries 1
        let err = decode(&descriptor, &[0x0a, 0x64, 0x41]).unwrap_err();
        assert!(matches!(err, crate::Error::ProtobufDecode(_)));
    }
}
