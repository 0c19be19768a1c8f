use bytes::Bytes;
use spbridge_types::{
    constants::BDSEQ,
    payload::{DataType, Metric, Payload},
    topic::{NodeMessage, NodeTopic, QoS},
    utils::timestamp,
};

/// Broker-side message properties (MQTT v5 user properties and content type).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageProperties {
    pub user_properties: Vec<(String, String)>,
    pub content_type: Option<String>,
}

impl MessageProperties {
    pub fn is_empty(&self) -> bool {
        self.user_properties.is_empty() && self.content_type.is_none()
    }
}

/// A message handed to a [Client](crate::Client) for publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: MessageProperties,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
    pub properties: MessageProperties,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// Clean shutdown requested by the client or a normal broker disconnect. Never reconnected.
    Graceful,
    /// Network failure, failed connection attempt or a broker disconnect with a failure reason code.
    Unexpected(String),
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Online,
    Offline(DisconnectReason),
    Publish(IncomingMessage),
    /// An outbound publish left the client (QoS 0) or was acknowledged by the broker.
    Acknowledged,
    /// The broker refused an outbound publish.
    Rejected { reason: String },
}

/// Structure representing the last will of a node
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

impl LastWill {
    /// Build an NDEATH will carrying `bd_seq`.
    pub fn new_node(group: &str, node_id: &str, bd_seq: u64) -> Self {
        let topic = NodeTopic::new(group, NodeMessage::NDeath, node_id);
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            retain,
            qos,
            payload: node_death_payload(bd_seq).into(),
            topic: topic.topic,
        }
    }
}

/// The NDEATH payload: a timestamp and the `bdSeq` of the session it terminates.
pub fn node_death_payload(bd_seq: u64) -> Payload {
    let mut metric = Metric::new();
    metric
        .set_name(BDSEQ.to_string())
        .set_datatype(DataType::Int64)
        .set_value(spbridge_types::payload::metric::Value::LongValue(bd_seq));
    Payload {
        timestamp: Some(timestamp()),
        metrics: vec![metric],
        seq: None,
        uuid: None,
        body: None,
    }
}

/// The observable state of a [Transport](crate::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Entered only after an unexpected disconnect, while the reconnect loop runs.
    Reconnecting,
}

/// Connection transitions delivered to listeners registered with
/// [Transport::on_connection_event](crate::Transport::on_connection_event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { epoch: u64 },
    Disconnected { graceful: bool },
}
