use spbridge::{
    store::{AliasRegistry, AliasRegistryConfig},
    types::{
        topic::{DeviceMessage, DeviceTopic},
        Metric, Value, ValueType,
    },
};

#[test]
fn facade_exposes_the_whole_stack() {
    let dir = tempfile::tempdir().unwrap();
    let aliases = AliasRegistry::new(AliasRegistryConfig::new(dir.path().join("a.db"))).unwrap();
    let alias = aliases.get_or_create("temp", "press").unwrap();

    let metric = Metric::new("temp", ValueType::Int32, Some(Value::Int(4)));
    let wire = metric.to_data_metric(alias).unwrap();
    assert_eq!(wire.alias, Some(alias));

    let topic = DeviceTopic::new("plant", DeviceMessage::DData, "bridge", "press");
    assert_eq!(topic.topic, "spBv1.0/plant/DDATA/bridge/press");
}

#[cfg(all(feature = "eon", feature = "rumqtt-client"))]
#[tokio::test]
async fn node_builds_over_rumqtt() {
    use spbridge::{
        client::{mqtt_client::rumqtt, Transport, TransportConfig},
        eon::NodeBuilder,
        store::{BirthCache, BirthCacheConfig},
    };
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let (eventloop, client) =
        rumqtt::EventLoop::new(rumqtt::MqttOptions::new("bridge", "localhost", 1883), 10);
    let transport = Transport::new(Box::new(eventloop), Arc::new(client), TransportConfig::default());
    let node = NodeBuilder::new(transport.clone())
        .with_group_id("plant")
        .with_node_id("bridge")
        .with_alias_registry(
            AliasRegistry::new(AliasRegistryConfig::new(dir.path().join("aliases.db"))).unwrap(),
        )
        .with_birth_cache(
            BirthCache::new(BirthCacheConfig::new(dir.path().join("births.db"))).unwrap(),
        )
        .build()
        .await
        .unwrap();
    assert_eq!(node.node_id(), "bridge");
    assert!(!node.is_online().await);
}
