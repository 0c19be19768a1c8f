use std::{sync::Arc, time::Duration};

use log::{error, info, LevelFilter};
use spbridge::{
    client::{mqtt_client::rumqtt, Transport, TransportConfig},
    eon::{NodeBuilder, RetainedPublisher, RetainedPublisherConfig},
    store::{
        AliasRegistry, AliasRegistryConfig, BirthCache, BirthCacheConfig, DedupStore,
        DedupStoreConfig,
    },
    types::{Metric, Value, ValueType},
};
use tokio::time;

fn press_metrics(tick: u64) -> Vec<Metric> {
    vec![
        Metric::new("Counter", ValueType::UInt64, Some(Value::UInt(tick))),
        Metric::new(
            "Temperature",
            ValueType::Double,
            Some(Value::Float(20.0 + (tick % 10) as f64 / 2.0)),
        )
        .with_unit("degC")
        .with_semantic_id("0173-1#02-AAV232#002"),
        Metric::new("Running", ValueType::Boolean, Some(Value::Bool(true))),
    ]
}

#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .init();

    let state_dir = std::env::temp_dir().join("spbridge-demo");
    let opts = rumqtt::MqttOptions::new("press-node", "localhost", 1883);
    let (eventloop, client) = rumqtt::EventLoop::new(opts, 64);
    let transport = Transport::new(
        Box::new(eventloop),
        Arc::new(client),
        TransportConfig::default(),
    );

    let dedup = DedupStore::new(DedupStoreConfig::new(state_dir.join("dedup.db"))).unwrap();
    let node = NodeBuilder::new(transport.clone())
        .with_group_id("plant")
        .with_node_id("press-node")
        .with_alias_registry(
            AliasRegistry::new(AliasRegistryConfig::new(state_dir.join("aliases.db"))).unwrap(),
        )
        .with_birth_cache(
            BirthCache::new(BirthCacheConfig::new(state_dir.join("births.db"))).unwrap(),
        )
        .with_dedup_store(dedup.clone())
        .build()
        .await
        .unwrap();
    let retained = RetainedPublisher::new(transport, RetainedPublisherConfig::default())
        .with_dedup(dedup);

    if let Err(e) = node.transport().connect_default().await {
        error!("Initial connection failed, retrying in the background: {e}");
    }

    let publisher = node.clone();
    tokio::spawn(async move {
        let mut tick = 0_u64;
        loop {
            let metrics = press_metrics(tick);
            match publisher.publish_device_data("press-1", metrics.clone()).await {
                Ok(()) => {
                    let values: Vec<(String, Metric)> = metrics
                        .into_iter()
                        .map(|m| (format!("plant/press-1/{}", m.path), m))
                        .collect();
                    if let Err(e) = retained
                        .publish_current_values(&values, Some("urn:demo:press-1"))
                        .await
                    {
                        error!("Retained publish failed: {e}");
                    }
                }
                Err(e) => info!("Skipping update {tick}: {e}"),
            }
            tick = tick.wrapping_add(1);
            time::sleep(Duration::from_secs(1)).await;
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        println!("Failed to register CTRL-C handler: {e}");
    }
    if let Err(e) = node.shutdown().await {
        error!("Shutdown failed: {e}");
    }
}
