//! The textual "current value" representation published on retained topics.

use serde::{Deserialize, Serialize};

use crate::metric::{Metric, Value};

pub const HEADER_SEMANTIC_ID: &str = "semanticId";
pub const HEADER_UNIT: &str = "unit";
pub const HEADER_VALUE_TYPE: &str = "valueType";
pub const HEADER_SOURCE: &str = "source";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Where semantic metadata travels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Inline in the JSON payload.
    #[default]
    Payload,
    /// As message user properties, with the payload reduced to value and timestamp.
    Headers,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainedPayload {
    pub value: Option<Value>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A fully rendered retained message body.
#[derive(Clone, Debug, PartialEq)]
pub struct RetainedMessage {
    pub payload: Vec<u8>,
    pub user_properties: Vec<(String, String)>,
}

impl RetainedPayload {
    pub fn from_metric(metric: &Metric, source: Option<&str>) -> Self {
        Self {
            value: metric.value.clone(),
            timestamp: metric.timestamp_ms,
            semantic_id: metric.semantic_id.clone(),
            unit: metric.unit.clone(),
            value_type: Some(metric.value_type.as_str().to_string()),
            source: source.map(str::to_string),
        }
    }

    /// Render the message for the given metadata mode.
    pub fn render(mut self, mode: MetadataMode) -> Result<RetainedMessage, serde_json::Error> {
        let mut user_properties = Vec::new();
        if mode == MetadataMode::Headers {
            let headers = [
                (HEADER_SEMANTIC_ID, self.semantic_id.take()),
                (HEADER_UNIT, self.unit.take()),
                (HEADER_VALUE_TYPE, self.value_type.take()),
                (HEADER_SOURCE, self.source.take()),
            ];
            for (key, value) in headers {
                if let Some(value) = value {
                    user_properties.push((key.to_string(), value));
                }
            }
        }
        Ok(RetainedMessage {
            payload: serde_json::to_vec(&self)?,
            user_properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::ValueType;

    fn metric() -> Metric {
        Metric::new("Speed", ValueType::Float, Some(Value::Float(3.5)))
            .with_timestamp(42)
            .with_unit("m/s")
    }

    #[test]
    fn payload_mode_inlines_metadata() {
        let msg = RetainedPayload::from_metric(&metric(), Some("urn:a"))
            .render(MetadataMode::Payload)
            .unwrap();
        assert!(msg.user_properties.is_empty());
        let json: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "value": 3.5,
                "timestamp": 42,
                "unit": "m/s",
                "valueType": "float",
                "source": "urn:a"
            })
        );
    }

    #[test]
    fn header_mode_moves_metadata_out_of_the_payload() {
        let msg = RetainedPayload::from_metric(&metric(), None)
            .render(MetadataMode::Headers)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(json, serde_json::json!({"value": 3.5, "timestamp": 42}));
        assert_eq!(
            msg.user_properties,
            vec![
                ("unit".to_string(), "m/s".to_string()),
                ("valueType".to_string(), "float".to_string())
            ]
        );
    }
}
