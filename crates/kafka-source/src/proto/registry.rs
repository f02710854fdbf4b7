use crate::error::{Error, Result};
use protobuf::reflect::{FileDescriptor, MessageDescriptor};
use protobuf::well_known_types;
use protobuf_parse::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Message descriptors parsed at runtime from a directory of `.proto` files.
///
/// Message types are resolved by fully qualified name (`shop.Order`), or by
/// simple name (`Order`) when exactly one message carries it.
pub struct ProtoRegistry {
    root: PathBuf,
    files: Vec<FileDescriptor>,
    loaded: HashMap<String, MessageDescriptor>,
}

impl std::fmt::Debug for ProtoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtoRegistry")
            .field("root", &self.root)
            .field("files", &self.files.len())
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProtoRegistry {
    /// Parse `.proto` files under `root`.
    ///
    /// `files` are paths relative to `root`; when empty, every `.proto` file
    /// found under `root` is parsed. Imports resolve against `root` and the
    /// bundled well-known types.
    pub fn from_dir(root: impl AsRef<Path>, files: &[PathBuf]) -> Result<Self> {
        let root = root.as_ref();
        let inputs = if files.is_empty() {
            let mut found = Vec::new();
            collect_proto_files(root, &mut found)?;
            found.sort();
            found
        } else {
            files.iter().map(|f| root.join(f)).collect()
        };

        if inputs.is_empty() {
            return Err(Error::ProtobufParse(format!(
                "No .proto files found in {}",
                root.display()
            )));
        }
        debug!("Parsing {} proto file(s) under {}", inputs.len(), root.display());

        let mut parser = Parser::new();
        parser.include(root);
        for input in &inputs {
            trace!("Adding proto input {}", input.display());
            parser.input(input);
        }
        let parsed = parser
            .parse_and_typecheck()
            .map_err(|e| Error::ProtobufParse(format!("{e:#}")))?;

        let files = build_file_descriptors(parsed.file_descriptors)?;
        Ok(Self {
            root: root.to_path_buf(),
            files,
            loaded: HashMap::new(),
        })
    }

    /// Parse a single `.proto` document held in memory.
    pub fn from_string(content: &str) -> Result<Self> {
        let dir = tempfile::tempdir()
            .map_err(|e| Error::ProtobufParse(format!("Failed to create temp dir: {e}")))?;
        let file = dir.path().join("schema.proto");
        std::fs::write(&file, content)
            .map_err(|e| Error::ProtobufParse(format!("Failed to write temp file: {e}")))?;
        Self::from_dir(dir.path(), &[PathBuf::from("schema.proto")])
    }

    /// Make sure `message_type` is known before consumption starts.
    pub fn load(&mut self, message_type: &str) -> Result<()> {
        if self.loaded.contains_key(message_type) {
            return Ok(());
        }
        let descriptor = self.find(message_type)?;
        debug!(
            "Message type {message_type} resolved to {}",
            descriptor.full_name()
        );
        self.loaded.insert(message_type.to_string(), descriptor);
        Ok(())
    }

    /// Descriptor of a message type previously passed to [`load`](Self::load).
    pub fn get(&self, message_type: &str) -> Result<&MessageDescriptor> {
        self.loaded
            .get(message_type)
            .ok_or_else(|| Error::MessageTypeNotFound(message_type.to_string()))
    }

    fn find(&self, message_type: &str) -> Result<MessageDescriptor> {
        let wanted = message_type.trim_start_matches('.');
        let all = self.all_messages();

        if let Some(found) = all.iter().find(|m| m.full_name() == wanted) {
            return Ok(found.clone());
        }

        let mut by_name = all.into_iter().filter(|m| m.name() == wanted);
        match (by_name.next(), by_name.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(Error::ProtobufParse(format!(
                "Message type {wanted} is ambiguous; use its fully qualified name"
            ))),
            _ => Err(Error::MessageTypeNotFound(message_type.to_string())),
        }
    }

    fn all_messages(&self) -> Vec<MessageDescriptor> {
        let mut out = Vec::new();
        for file in &self.files {
            for message in file.messages() {
                push_with_nested(message, &mut out);
            }
        }
        out
    }
}

fn push_with_nested(message: MessageDescriptor, out: &mut Vec<MessageDescriptor>) {
    for nested in message.nested_messages() {
        push_with_nested(nested, out);
    }
    out.push(message);
}

fn collect_proto_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_proto_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "proto") {
            out.push(path);
        }
    }
    Ok(())
}

fn well_known_files() -> Vec<FileDescriptor> {
    vec![
        well_known_types::any::file_descriptor().clone(),
        well_known_types::api::file_descriptor().clone(),
        well_known_types::duration::file_descriptor().clone(),
        well_known_types::empty::file_descriptor().clone(),
        well_known_types::field_mask::file_descriptor().clone(),
        well_known_types::source_context::file_descriptor().clone(),
        well_known_types::struct_::file_descriptor().clone(),
        well_known_types::timestamp::file_descriptor().clone(),
        well_known_types::type_::file_descriptor().clone(),
        well_known_types::wrappers::file_descriptor().clone(),
        protobuf::descriptor::file_descriptor().clone(),
    ]
}

/// Turn parsed file protos into dynamic descriptors, dependencies first.
fn build_file_descriptors(
    protos: Vec<protobuf::descriptor::FileDescriptorProto>,
) -> Result<Vec<FileDescriptor>> {
    let well_known = well_known_files();
    let mut built: Vec<FileDescriptor> = Vec::new();
    let mut pending = protos;

    let lookup = |built: &[FileDescriptor], name: &str| -> Option<FileDescriptor> {
        built
            .iter()
            .chain(well_known.iter())
            .find(|f| f.proto().name() == name)
            .cloned()
    };

    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();

        for proto in pending {
            if lookup(&built, proto.name()).is_some() {
                continue;
            }
            let deps: Option<Vec<FileDescriptor>> = proto
                .dependency
                .iter()
                .map(|dep| lookup(&built, dep))
                .collect();
            match deps {
                Some(deps) => {
                    let name = proto.name().to_string();
                    let file = FileDescriptor::new_dynamic(proto, &deps).map_err(|e| {
                        Error::ProtobufParse(format!("Failed to build descriptor of {name}: {e}"))
                    })?;
                    built.push(file);
                }
                None => waiting.push(proto),
            }
        }

        if waiting.len() == before {
            let names: Vec<&str> = waiting.iter().map(|p| p.name()).collect();
            return Err(Error::ProtobufParse(format!(
                "Unresolved imports in {}",
                names.join(", ")
            )));
        }
        pending = waiting;
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ORDERS: &str = r#"
        syntax = "proto3";
        package shop;

        import "google/protobuf/timestamp.proto";

        message Order {
            string id = 1;
            int64 amount = 2;
            google.protobuf.Timestamp placed_at = 3;

            message Line {
                string sku = 1;
            }
            repeated Line lines = 4;
        }
    "#;

    #[test]
    fn test_from_string_resolves_names() {
        let mut registry = ProtoRegistry::from_string(ORDERS).unwrap();

        registry.load("shop.Order").unwrap();
        registry.load("Line").unwrap();
        assert_eq!(registry.get("shop.Order").unwrap().full_name(), "shop.Order");
        assert_eq!(registry.get("Line").unwrap().full_name(), "shop.Order.Line");
    }

    #[test]
    fn test_unknown_message_type() {
        let mut registry = ProtoRegistry::from_string(ORDERS).unwrap();
        let err = registry.load("shop.Refund").unwrap_err();
        assert!(matches!(err, Error::MessageTypeNotFound(name) if name == "shop.Refund"));

        // Not loaded, so not available
        assert!(registry.get("shop.Order").is_err());
    }

    #[test]
    fn test_from_dir_with_imports() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("common")).unwrap();
        std::fs::write(
            tmp.path().join("common/money.proto"),
            "syntax = \"proto3\";\npackage common;\nmessage Money { int64 units = 1; }\n",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("payment.proto"),
            "syntax = \"proto3\";\npackage billing;\nimport \"common/money.proto\";\nmessage Payment { common.Money total = 1; }\n",
        )
        .unwrap();

        let mut registry = ProtoRegistry::from_dir(tmp.path(), &[]).unwrap();
        registry.load("billing.Payment").unwrap();
        registry.load("common.Money").unwrap();
    }

    #[test]
    fn test_empty_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = ProtoRegistry::from_dir(tmp.path(), &[]).unwrap_err();
        assert!(matches!(err, Error::ProtobufParse(_)));
    }

    #[test]
    fn test_syntax_error() {
        let err = ProtoRegistry::from_string("message {").unwrap_err();
        assert!(matches!(err, Error::ProtobufParse(_)));
    }
}
