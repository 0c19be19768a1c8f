use std::{path::Path, sync::Arc, time::Duration};

use spbridge_client::{
    channel::{ChannelBroker, ChannelEventLoop, OutboundMessage},
    Event, PublishRequest, Transport, TransportConfig,
};
use spbridge_eon::{NodeBuilder, SparkplugNode};
use spbridge_store::{AliasRegistry, AliasRegistryConfig, BirthCache, BirthCacheConfig};
use spbridge_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    payload::{metric, DataType, Message, Payload},
    topic::{DeviceMessage, DeviceTopic, NodeMessage, NodeTopic, QoS, TopicFilter},
    Metric, Value, ValueType,
};
use tokio::time::timeout;

pub const GROUP: &str = "plant";
pub const NODE: &str = "bridge";
pub const WAIT: Duration = Duration::from_secs(2);

pub fn transport() -> (Transport, ChannelBroker) {
    let (eventloop, client, broker) = ChannelEventLoop::new();
    let config = TransportConfig {
        connect_timeout: WAIT,
        min_reconnect_delay: Duration::from_millis(10),
        max_reconnect_delay: Duration::from_millis(40),
    };
    (
        Transport::new(Box::new(eventloop), Arc::new(client), config),
        broker,
    )
}

/// A builder with stores placed under `dir`.
pub fn builder(dir: &Path, transport: Transport) -> NodeBuilder {
    NodeBuilder::new(transport)
        .with_group_id(GROUP)
        .with_node_id(NODE)
        .with_alias_registry(AliasRegistry::new(AliasRegistryConfig::new(dir.join("aliases.db"))).unwrap())
        .with_birth_cache(BirthCache::new(BirthCacheConfig::new(dir.join("births.db"))).unwrap())
}

/// Bring the broker session up and wait for the node birth.
pub async fn connect(node: &SparkplugNode, broker: &mut ChannelBroker, expected_bdseq: u64) {
    broker.tx_event.send(Event::Online).unwrap();
    node.connect(WAIT).await.unwrap();
    expect_node_online(broker, expected_bdseq).await;
}

pub fn command_filters() -> Vec<TopicFilter> {
    vec![
        TopicFilter::new_with_qos(
            NodeTopic::new(GROUP, NodeMessage::NCmd, NODE).topic,
            QoS::AtLeastOnce,
        ),
        TopicFilter::new_with_qos(
            DeviceTopic::new(GROUP, DeviceMessage::DCmd, NODE, "+").topic,
            QoS::AtLeastOnce,
        ),
    ]
}

pub async fn next_outbound(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(WAIT, broker.rx_outbound.recv())
        .await
        .unwrap()
        .unwrap()
}

/// Next publish. Every Sparkplug message goes out with QoS 0 and without retain.
pub async fn next_publish(broker: &mut ChannelBroker) -> (PublishRequest, Payload) {
    match next_outbound(broker).await {
        OutboundMessage::Publish(request) => {
            assert_eq!(request.qos, QoS::AtMostOnce, "{}", request.topic);
            assert!(!request.retain, "{}", request.topic);
            let payload = Payload::decode(request.payload.as_slice()).unwrap();
            (request, payload)
        }
        other => panic!("expected a publish, got {other:?}"),
    }
}

pub async fn assert_quiet(broker: &mut ChannelBroker) {
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(broker.rx_outbound.try_recv().is_err());
}

pub async fn expect_node_online(broker: &mut ChannelBroker, expected_bdseq: u64) {
    /* subscriptions are replayed before the node is told about the session */
    assert_eq!(
        next_outbound(broker).await,
        OutboundMessage::Subscribe(command_filters())
    );
    let (request, payload) = next_publish(broker).await;
    assert_eq!(request.topic, NodeTopic::new(GROUP, NodeMessage::NBirth, NODE).topic);
    verify_nbirth_payload(&payload, expected_bdseq);
    assert_eq!(
        next_outbound(broker).await,
        OutboundMessage::Subscribe(command_filters())
    );
}

pub fn verify_nbirth_payload(payload: &Payload, expected_bdseq: u64) {
    assert_eq!(payload.seq, Some(0));
    assert_ne!(payload.timestamp, None);

    let mut contains_node_control = false;
    let mut contains_bdseq = false;
    for metric in &payload.metrics {
        assert_ne!(metric.datatype, None);
        assert_eq!(metric.alias, None);
        match metric.name.as_deref() {
            Some(NODE_CONTROL_REBIRTH) => {
                contains_node_control = true;
                assert_eq!(metric.datatype, Some(DataType::Boolean as u32));
                assert_eq!(metric.value, Some(metric::Value::BooleanValue(false)));
            }
            Some(BDSEQ) => {
                contains_bdseq = true;
                assert_eq!(metric.datatype, Some(DataType::Int64 as u32));
                assert_eq!(
                    metric.value,
                    Some(metric::Value::LongValue(expected_bdseq))
                );
            }
            other => panic!("unexpected metric in NBIRTH: {other:?}"),
        }
    }
    assert!(contains_node_control);
    assert!(contains_bdseq);
}

/// Checks a DBIRTH and returns `(name, alias)` of each metric.
pub fn verify_dbirth_payload(payload: &Payload, expected_seq: u64) -> Vec<(String, u64)> {
    assert_eq!(payload.seq, Some(expected_seq));
    assert_ne!(payload.timestamp, None);
    payload
        .metrics
        .iter()
        .map(|m| {
            assert_ne!(m.datatype, None);
            assert_ne!(m.timestamp, None);
            (m.name.clone().unwrap(), m.alias.unwrap())
        })
        .collect()
}

/// Checks a DDATA and returns the aliases it carries. Names are never sent.
pub fn verify_ddata_payload(payload: &Payload, expected_seq: u64) -> Vec<u64> {
    assert_eq!(payload.seq, Some(expected_seq));
    payload
        .metrics
        .iter()
        .map(|m| {
            assert_eq!(m.name, None);
            assert_eq!(m.datatype, None);
            m.alias.unwrap()
        })
        .collect()
}

pub fn device_topic(message: DeviceMessage, device_id: &str) -> String {
    DeviceTopic::new(GROUP, message, NODE, device_id).topic
}

pub fn float_metric(path: &str, value: f64) -> Metric {
    Metric::new(path, ValueType::Double, Some(Value::Float(value)))
}
