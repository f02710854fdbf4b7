use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Protobuf parse error: {0}")]
    ProtobufParse(String),

    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] protobuf::Error),

    #[error("Message type not found: {0}")]
    MessageTypeNotFound(String),

    #[error("No message type is registered for topic {0}")]
    UnknownTopic(String),

    #[error("Invalid topic '{spec}': {reason}")]
    InvalidSubscription { spec: String, reason: String },

    #[error("Failed to parse the search query: {0}")]
    Filter(#[from] regex::Error),

    #[error("Failed to marshal the message: {0}")]
    Marshal(#[from] serde_json::Error),

    #[error("Failed to write to the output of topic {topic}: {source}")]
    Sink {
        topic: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Types(#[from] kafka_types::KafkaTypesError),

    #[error(transparent)]
    OffsetStore(#[from] checkpoint::OffsetStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
