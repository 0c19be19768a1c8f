mod utils;

use spbridge_client::{channel::OutboundMessage, Event};
use spbridge_eon::{RetainedPublisher, RetainedPublisherConfig};
use spbridge_store::{DedupStore, DedupStoreConfig};
use spbridge_types::{retained::MetadataMode, topic::QoS};
use utils::{assert_quiet, float_metric, next_outbound, transport, WAIT};

#[tokio::test]
async fn current_values_are_published_retained_with_headers() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, mut broker) = transport();
    broker.tx_event.send(Event::Online).unwrap();
    transport.connect(WAIT).await.unwrap();

    let dedup = DedupStore::new(DedupStoreConfig::new(dir.path().join("dedup.db"))).unwrap();
    let config = RetainedPublisherConfig {
        metadata_mode: MetadataMode::Headers,
        ..Default::default()
    };
    let publisher = RetainedPublisher::new(transport, config).with_dedup(dedup);

    let values = vec![
        (
            "plant/press/temp".to_string(),
            float_metric("temp", 20.5).with_timestamp(7).with_unit("degC"),
        ),
        (
            "plant/press/pressure".to_string(),
            float_metric("pressure", 1.5).with_timestamp(7),
        ),
    ];
    assert_eq!(
        publisher
            .publish_current_values(&values, Some("urn:press"))
            .await
            .unwrap(),
        2
    );

    let OutboundMessage::Publish(request) = next_outbound(&mut broker).await else {
        panic!("expected a publish");
    };
    assert_eq!(request.topic, "plant/press/temp");
    assert_eq!(request.qos, QoS::AtLeastOnce);
    assert!(request.retain);
    assert_eq!(
        request.properties.content_type.as_deref(),
        Some("application/json")
    );
    assert!(request
        .properties
        .user_properties
        .contains(&("unit".to_string(), "degC".to_string())));
    assert!(request
        .properties
        .user_properties
        .contains(&("source".to_string(), "urn:press".to_string())));
    let json: serde_json::Value = serde_json::from_slice(&request.payload).unwrap();
    assert_eq!(json, serde_json::json!({"value": 20.5, "timestamp": 7}));
    assert!(matches!(
        next_outbound(&mut broker).await,
        OutboundMessage::Publish(_)
    ));

    /* only the changed value goes out again */
    let values = vec![
        values[0].clone(),
        (
            "plant/press/pressure".to_string(),
            float_metric("pressure", 1.75),
        ),
    ];
    assert_eq!(
        publisher.publish_current_values(&values, None).await.unwrap(),
        1
    );
    let OutboundMessage::Publish(request) = next_outbound(&mut broker).await else {
        panic!("expected a publish");
    };
    assert_eq!(request.topic, "plant/press/pressure");
    assert_quiet(&mut broker).await;
}

#[tokio::test]
async fn publishing_without_session_fails() {
    let (transport, _broker) = transport();
    let publisher = RetainedPublisher::new(transport, RetainedPublisherConfig::default());
    let values = vec![("plant/press/temp".to_string(), float_metric("temp", 1.0))];
    assert!(publisher.publish_current_values(&values, None).await.is_err());
}
