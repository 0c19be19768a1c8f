use serde::{Deserialize, Serialize};

use crate::{metric::Value, payload::metric};

/// The value carried by a control (command) message.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

const TRUTHY_STRINGS: [&str; 4] = ["true", "1", "yes", "on"];

impl ControlValue {
    /// Numbers are true when non-zero. Strings are true when they match
    /// `true`, `1`, `yes` or `on`, ignoring case and surrounding whitespace.
    pub fn is_truthy(&self) -> bool {
        match self {
            ControlValue::Bool(b) => *b,
            ControlValue::Int(i) => *i != 0,
            ControlValue::Float(f) => *f != 0.0 && !f.is_nan(),
            ControlValue::String(s) => {
                let s = s.trim();
                TRUTHY_STRINGS.iter().any(|t| s.eq_ignore_ascii_case(t))
            }
        }
    }

    /// Read a control value out of a wire metric value.
    pub fn from_wire(value: &metric::Value) -> Option<Self> {
        let out = match value {
            metric::Value::BooleanValue(b) => ControlValue::Bool(*b),
            metric::Value::IntValue(i) => ControlValue::Int(*i as i64),
            metric::Value::LongValue(i) => ControlValue::Int(*i as i64),
            metric::Value::FloatValue(f) => ControlValue::Float(*f as f64),
            metric::Value::DoubleValue(f) => ControlValue::Float(*f),
            metric::Value::StringValue(s) => ControlValue::String(s.clone()),
            metric::Value::BytesValue(_) => return None,
        };
        Some(out)
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let out = match value {
            serde_json::Value::Bool(b) => ControlValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ControlValue::Int(i),
                None => ControlValue::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => ControlValue::String(s.clone()),
            _ => return None,
        };
        Some(out)
    }
}

impl TryFrom<&Value> for ControlValue {
    type Error = ();

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let out = match value {
            Value::Bool(b) => ControlValue::Bool(*b),
            Value::Int(i) => ControlValue::Int(*i),
            Value::UInt(u) => ControlValue::Int(i64::try_from(*u).unwrap_or(i64::MAX)),
            Value::Float(f) => ControlValue::Float(*f),
            Value::String(s) => ControlValue::String(s.clone()),
            Value::Bytes(_) => return Err(()),
        };
        Ok(out)
    }
}

/// A JSON command addressed to a command topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestor: Option<String>,
}

impl CommandRequest {
    /// Parse a JSON command. Anything that is not a JSON object with a `value` field is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn control_value(&self) -> Option<ControlValue> {
        ControlValue::from_json(&self.value)
    }

    pub fn is_truthy(&self) -> bool {
        self.control_value().is_some_and(|v| v.is_truthy())
    }
}
