use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, SPARKPLUG_QOS, SPARKPLUG_RETAIN,
    SPBV01,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceMessage {
    DBirth,
    DDeath,
    DData,
    DCmd,
}

impl DeviceMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMessage::DBirth => DBIRTH,
            DeviceMessage::DDeath => DDEATH,
            DeviceMessage::DData => DDATA,
            DeviceMessage::DCmd => DCMD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMessage {
    NBirth,
    NDeath,
    NData,
    NCmd,
}

impl NodeMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMessage::NBirth => NBIRTH,
            NodeMessage::NDeath => NDEATH,
            NodeMessage::NData => NDATA,
            NodeMessage::NCmd => NCMD,
        }
    }
}

/// Publish settings shared by every Sparkplug message type.
///
/// Deliberately not derived from the message type or from configuration.
fn sparkplug_quality_retain() -> (QoS, bool) {
    (SPARKPLUG_QOS, SPARKPLUG_RETAIN)
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeTopic {
    pub topic: String,
    pub message_type: NodeMessage,
}

impl NodeTopic {
    pub fn new(group_id: &str, message_type: NodeMessage, node_id: &str) -> Self {
        Self {
            topic: node_topic(group_id, &message_type, node_id),
            message_type,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        sparkplug_quality_retain()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceTopic {
    pub topic: String,
    pub message_type: DeviceMessage,
}

impl DeviceTopic {
    pub fn new(group_id: &str, message_type: DeviceMessage, node_id: &str, device_id: &str) -> Self {
        Self {
            topic: device_topic(group_id, &message_type, node_id, device_id),
            message_type,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        sparkplug_quality_retain()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: String,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new<T: Into<String>>(topic: T) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos<T: Into<String>>(topic: T, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

pub fn node_topic(group_id: &str, message_type: &NodeMessage, node_id: &str) -> String {
    format!("{}/{}/{}/{}", SPBV01, group_id, message_type.as_str(), node_id)
}

pub fn device_topic(
    group_id: &str,
    message_type: &DeviceMessage,
    node_id: &str,
    device_id: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        SPBV01,
        group_id,
        message_type.as_str(),
        node_id,
        device_id
    )
}

#[derive(Error, Debug, PartialEq)]
pub enum TopicError {
    #[error("The topic was not in the Sparkplug namespace")]
    NotSparkplug,
    #[error("The topic was invalid")]
    InvalidSparkplugTopic,
}

/// A topic in the Sparkplug namespace, split into its parts.
#[derive(Debug, PartialEq)]
pub enum SparkplugTopic {
    Node {
        group_id: String,
        message_type: NodeMessage,
        node_id: String,
    },
    Device {
        group_id: String,
        message_type: DeviceMessage,
        node_id: String,
        device_id: String,
    },
}

enum MessageProducer {
    Device(DeviceMessage),
    Node(NodeMessage),
}

fn process_topic_message(message_part: &str) -> Result<MessageProducer, TopicError> {
    let producer = match message_part {
        NBIRTH => MessageProducer::Node(NodeMessage::NBirth),
        NDEATH => MessageProducer::Node(NodeMessage::NDeath),
        NDATA => MessageProducer::Node(NodeMessage::NData),
        NCMD => MessageProducer::Node(NodeMessage::NCmd),
        DBIRTH => MessageProducer::Device(DeviceMessage::DBirth),
        DDEATH => MessageProducer::Device(DeviceMessage::DDeath),
        DDATA => MessageProducer::Device(DeviceMessage::DData),
        DCMD => MessageProducer::Device(DeviceMessage::DCmd),
        _ => return Err(TopicError::InvalidSparkplugTopic),
    };
    Ok(producer)
}

impl SparkplugTopic {
    /// Parse a concrete (non wildcard) topic.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let mut iter = topic.split('/');

        if iter.next() != Some(SPBV01) {
            return Err(TopicError::NotSparkplug);
        }

        let group_id = match iter.next() {
            Some(val) if !val.is_empty() => val.to_string(),
            _ => return Err(TopicError::InvalidSparkplugTopic),
        };

        let producer = match iter.next() {
            Some(val) => process_topic_message(val)?,
            None => return Err(TopicError::InvalidSparkplugTopic),
        };

        let node_id = match iter.next() {
            Some(val) if !val.is_empty() => val.to_string(),
            _ => return Err(TopicError::InvalidSparkplugTopic),
        };

        let topic = match producer {
            MessageProducer::Node(message_type) => {
                if iter.next().is_some() {
                    return Err(TopicError::InvalidSparkplugTopic);
                }
                SparkplugTopic::Node {
                    group_id,
                    message_type,
                    node_id,
                }
            }
            MessageProducer::Device(message_type) => {
                let device_id = match iter.next() {
                    Some(val) if !val.is_empty() => val.to_string(),
                    _ => return Err(TopicError::InvalidSparkplugTopic),
                };
                if iter.next().is_some() {
                    return Err(TopicError::InvalidSparkplugTopic);
                }
                SparkplugTopic::Device {
                    group_id,
                    message_type,
                    node_id,
                    device_id,
                }
            }
        };
        Ok(topic)
    }
}

/// Check whether a concrete topic name matches an MQTT topic filter.
///
/// Filters beginning with a wildcard never match topics beginning with `$`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validate an MQTT topic filter.
pub fn validate_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("topic filter must not be empty".into());
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != last) {
            return Err(format!("invalid multi-level wildcard in filter {filter}"));
        }
        if level.contains('+') && *level != "+" {
            return Err(format!("invalid single-level wildcard in filter {filter}"));
        }
    }
    Ok(())
}
