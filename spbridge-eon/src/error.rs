use spbridge_client::TransportError;
use spbridge_store::StoreError;
use spbridge_types::ValueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Node is offline")]
    NodeOffline,
    #[error("Unknown device: {0}")]
    DeviceUnknown(String),
    #[error("No metrics provided")]
    NoMetrics,
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Metric encoding error: {0}")]
    Encode(#[from] ValueError),
    #[error("Cached payload could not be decoded: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Retained payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}
