pub use crate::generated::sparkplug_payload::{payload::*, *};

pub use prost::Message;

use crate::constants::BDSEQ;

impl Metric {
    pub fn new() -> Self {
        Self {
            name: None,
            alias: None,
            timestamp: None,
            datatype: None,
            is_historical: None,
            is_transient: None,
            is_null: Some(true),
            metadata: None,
            properties: None,
            value: None,
        }
    }

    pub fn set_name(&mut self, name: String) -> &mut Self {
        self.name = Some(name);
        self
    }

    pub fn set_alias(&mut self, alias: u64) -> &mut Self {
        self.alias = Some(alias);
        self
    }

    pub fn set_datatype(&mut self, datatype: DataType) -> &mut Self {
        self.datatype = Some(datatype as u32);
        self
    }

    pub fn set_timestamp(&mut self, timestamp: u64) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn set_value(&mut self, value: metric::Value) -> &mut Self {
        self.value = Some(value);
        self.is_null = None;
        self
    }

    pub fn set_null(&mut self) -> &mut Self {
        self.value = None;
        self.is_null = Some(true);
        self
    }
}

impl From<Payload> for Vec<u8> {
    fn from(value: Payload) -> Self {
        value.encode_to_vec()
    }
}

impl Payload {
    /// Read the `bdSeq` metric of a birth or death payload, if present.
    pub fn bdseq(&self) -> Option<u64> {
        self.metrics
            .iter()
            .find(|m| m.name.as_deref() == Some(BDSEQ))
            .and_then(|m| match m.value {
                Some(metric::Value::LongValue(v)) => Some(v),
                Some(metric::Value::IntValue(v)) => Some(v as u64),
                _ => None,
            })
    }
}

/// Wire metrics carry the datatype as a `u32`.
impl TryFrom<u32> for DataType {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        i32::try_from(v)
            .ok()
            .and_then(|v| DataType::try_from(v).ok())
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bdseq_is_read_from_birth_metrics() {
        let mut bdseq = Metric::new();
        bdseq
            .set_name(BDSEQ.to_string())
            .set_value(metric::Value::LongValue(7));
        let mut other = Metric::new();
        other
            .set_name("Other".to_string())
            .set_value(metric::Value::LongValue(99));
        let payload = Payload {
            timestamp: Some(0),
            metrics: vec![other, bdseq],
            seq: Some(0),
            uuid: None,
            body: None,
        };
        assert_eq!(payload.bdseq(), Some(7));

        let decoded = Payload::decode(payload.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn new_metric_is_null_unlike_the_message_default() {
        assert_eq!(Metric::default().is_null, None);
        assert_eq!(Metric::new().is_null, Some(true));
        assert_eq!(
            Metric {
                is_null: Some(true),
                ..Metric::default()
            },
            Metric::new()
        );
    }

    #[test]
    fn datatype_from_u32() {
        assert_eq!(DataType::try_from(11u32), Ok(DataType::Boolean));
        assert_eq!(DataType::try_from(17u32), Ok(DataType::Bytes));
        assert!(DataType::try_from(99u32).is_err());
    }
}
