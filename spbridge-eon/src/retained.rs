use log::{debug, error, warn};
use serde::Deserialize;
use spbridge_client::{MessageProperties, Transport};
use spbridge_store::DedupStore;
use spbridge_types::{
    retained::{MetadataMode, RetainedPayload, JSON_CONTENT_TYPE},
    topic::QoS,
    Metric,
};

use crate::PublishError;

fn default_qos() -> QoS {
    QoS::AtLeastOnce
}

fn default_retain() -> bool {
    true
}

/// Settings for the retained current value topics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetainedPublisherConfig {
    #[serde(default = "default_qos")]
    pub qos: QoS,
    #[serde(default = "default_retain")]
    pub retain: bool,
    #[serde(default)]
    pub metadata_mode: MetadataMode,
}

impl Default for RetainedPublisherConfig {
    fn default() -> Self {
        Self {
            qos: default_qos(),
            retain: default_retain(),
            metadata_mode: MetadataMode::default(),
        }
    }
}

/// Publishes the current value of each metric as a retained JSON message on its own topic.
///
/// These topics sit next to the Sparkplug namespace and let late joining consumers read the
/// latest values without waiting for a birth.
#[derive(Clone)]
pub struct RetainedPublisher {
    transport: Transport,
    config: RetainedPublisherConfig,
    dedup: Option<DedupStore>,
}

impl RetainedPublisher {
    pub fn new(transport: Transport, config: RetainedPublisherConfig) -> Self {
        Self {
            transport,
            config,
            dedup: None,
        }
    }

    /// Only publish values that differ from the last published one on the same topic.
    pub fn with_dedup(mut self, dedup: DedupStore) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Publish `(topic, metric)` pairs. Returns how many messages were published.
    ///
    /// Values published before a failure are still recorded as published.
    pub async fn publish_current_values(
        &self,
        values: &[(String, Metric)],
        source: Option<&str>,
    ) -> Result<usize, PublishError> {
        let entries = values.iter().map(|(topic, metric)| (topic.as_str(), metric));
        let changed = match &self.dedup {
            Some(dedup) => dedup.filter_changed(entries)?,
            None => entries.collect(),
        };
        if changed.is_empty() {
            debug!("No changed retained values");
            return Ok(0);
        }

        let mut published = Vec::with_capacity(changed.len());
        let mut result: Result<(), PublishError> = Ok(());
        for (topic, metric) in changed {
            let message = match RetainedPayload::from_metric(metric, source)
                .render(self.config.metadata_mode)
            {
                Ok(message) => message,
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            };
            let properties = MessageProperties {
                user_properties: message.user_properties,
                content_type: Some(JSON_CONTENT_TYPE.to_string()),
            };
            if let Err(e) = self
                .transport
                .publish(
                    topic.to_string(),
                    message.payload,
                    self.config.qos,
                    self.config.retain,
                    Some(properties),
                )
                .await
            {
                warn!("Retained publish on {topic} failed: {e}");
                result = Err(e.into());
                break;
            }
            published.push((topic, metric));
        }

        let count = published.len();
        if let Some(dedup) = &self.dedup {
            if let Err(e) = dedup.record_published_batch(published) {
                error!("Failed to record retained values: {e}");
            }
        }
        result.map(|_| count)
    }
}
