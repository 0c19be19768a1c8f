use std::collections::BTreeMap;

use spbridge_types::{
    constants::PROPERTY_SOURCE,
    payload::{self, Payload},
    string_property, Metric, ValueError,
};

/// Sequence state of the node session.
///
/// `seq` is the value the next outbound message carries. It is only advanced once a message has
/// been handed to the transport, so a failed publish does not leave a gap.
#[derive(Debug)]
pub(crate) struct NodeLifecycle {
    bd_seq: u64,
    seq: u8,
    online: bool,
    birthed: bool,
}

impl NodeLifecycle {
    pub(crate) fn new(initial_bd_seq: u64) -> Self {
        Self {
            bd_seq: initial_bd_seq,
            seq: 0,
            online: false,
            birthed: false,
        }
    }

    /// The `bdSeq` the next NBIRTH carries. Every NBIRTH after the first increments it.
    pub(crate) fn next_bd_seq(&self) -> u64 {
        if self.birthed {
            self.bd_seq + 1
        } else {
            self.bd_seq
        }
    }

    /// Record a published NBIRTH. The NBIRTH itself carried seq 0.
    pub(crate) fn node_birth_sent(&mut self, bd_seq: u64) {
        self.bd_seq = bd_seq;
        self.birthed = true;
        self.online = true;
        self.seq = 1;
    }

    pub(crate) fn bd_seq(&self) -> u64 {
        self.bd_seq
    }

    pub(crate) fn seq(&self) -> u8 {
        self.seq
    }

    pub(crate) fn advance_seq(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online
    }

    pub(crate) fn set_offline(&mut self) {
        self.online = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AliasedMetric {
    pub metric: Metric,
    pub alias: u64,
}

/// The last full metric set of a device, kept so a rebirth needs no source re-query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeviceSnapshot {
    metrics: BTreeMap<String, AliasedMetric>,
    source: Option<String>,
}

impl DeviceSnapshot {
    pub(crate) fn new(metrics: Vec<AliasedMetric>, source: Option<String>) -> Self {
        Self {
            metrics: metrics
                .into_iter()
                .map(|m| (m.metric.path.clone(), m))
                .collect(),
            source,
        }
    }

    /// Rebuild a snapshot from an encoded DBIRTH payload.
    pub(crate) fn from_birth(payload: &Payload) -> Result<Self, ValueError> {
        let mut metrics = Vec::with_capacity(payload.metrics.len());
        for wire in &payload.metrics {
            let Some(alias) = wire.alias else {
                continue;
            };
            metrics.push(AliasedMetric {
                metric: Metric::try_from(wire)?,
                alias,
            });
        }
        Ok(Self::new(metrics, birth_source(payload)))
    }

    pub(crate) fn alias(&self, path: &str) -> Option<u64> {
        self.metrics.get(path).map(|m| m.alias)
    }

    pub(crate) fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Apply changed values. Paths not already in the snapshot are ignored.
    pub(crate) fn update(&mut self, metrics: &[Metric]) {
        for metric in metrics {
            if let Some(entry) = self.metrics.get_mut(&metric.path) {
                entry.metric = metric.clone();
            }
        }
    }

    pub(crate) fn metrics(&self) -> Vec<Metric> {
        self.metrics.values().map(|m| m.metric.clone()).collect()
    }
}

/// The `source` property carried by the metrics of a device birth.
pub(crate) fn birth_source(payload: &Payload) -> Option<String> {
    payload
        .metrics
        .iter()
        .filter_map(|m| m.properties.as_ref())
        .find_map(|p| string_property(p, PROPERTY_SOURCE))
}

/// Overlay `changed` onto `base`, keyed by path.
pub(crate) fn merge_metrics(base: Vec<Metric>, changed: Vec<Metric>) -> Vec<Metric> {
    let mut merged: BTreeMap<String, Metric> =
        base.into_iter().map(|m| (m.path.clone(), m)).collect();
    for metric in changed {
        merged.insert(metric.path.clone(), metric);
    }
    merged.into_values().collect()
}

/// Per device protocol state.
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    /// A DBIRTH was published in the current node session.
    pub born: bool,
    pub snapshot: Option<DeviceSnapshot>,
}

pub(crate) fn wire_metrics(
    metrics: &[AliasedMetric],
    source: Option<&str>,
) -> Result<Vec<payload::Metric>, ValueError> {
    metrics
        .iter()
        .map(|m| m.metric.to_birth_metric(m.alias, source))
        .collect()
}

#[cfg(test)]
mod tests {
    use spbridge_types::{Value, ValueType};

    use super::*;

    fn metric(path: &str, value: i64) -> Metric {
        Metric::new(path, ValueType::Int64, Some(Value::Int(value))).with_timestamp(10)
    }

    #[test]
    fn bd_seq_increments_after_first_birth() {
        let mut lifecycle = NodeLifecycle::new(4);
        assert_eq!(lifecycle.next_bd_seq(), 4);
        lifecycle.node_birth_sent(4);
        assert_eq!(lifecycle.bd_seq(), 4);
        assert_eq!(lifecycle.next_bd_seq(), 5);
        lifecycle.set_offline();
        assert_eq!(lifecycle.next_bd_seq(), 5);
        lifecycle.node_birth_sent(5);
        assert_eq!(lifecycle.next_bd_seq(), 6);
    }

    #[test]
    fn seq_wraps_and_resets_on_birth() {
        let mut lifecycle = NodeLifecycle::new(0);
        lifecycle.node_birth_sent(0);
        assert_eq!(lifecycle.seq(), 1);
        for _ in 0..255 {
            lifecycle.advance_seq();
        }
        assert_eq!(lifecycle.seq(), 0);
        lifecycle.advance_seq();
        lifecycle.node_birth_sent(1);
        assert_eq!(lifecycle.seq(), 1);
    }

    #[test]
    fn merge_overrides_by_path() {
        let merged = merge_metrics(
            vec![metric("a", 1), metric("b", 2)],
            vec![metric("b", 3), metric("c", 4)],
        );
        let values: Vec<(String, Option<Value>)> =
            merged.into_iter().map(|m| (m.path, m.value)).collect();
        assert_eq!(
            values,
            vec![
                ("a".to_string(), Some(Value::Int(1))),
                ("b".to_string(), Some(Value::Int(3))),
                ("c".to_string(), Some(Value::Int(4))),
            ]
        );
    }

    #[test]
    fn snapshot_round_trips_through_birth_payload() {
        let snapshot = DeviceSnapshot::new(
            vec![
                AliasedMetric {
                    metric: metric("a", 1).with_unit("bar"),
                    alias: 7,
                },
                AliasedMetric {
                    metric: metric("b", 2),
                    alias: 8,
                },
            ],
            Some("plant.aml".to_string()),
        );
        let aliased: Vec<AliasedMetric> = snapshot.metrics.values().cloned().collect();
        let payload = Payload {
            timestamp: Some(1),
            seq: Some(1),
            metrics: wire_metrics(&aliased, snapshot.source()).unwrap(),
            uuid: None,
            body: None,
        };
        let restored = DeviceSnapshot::from_birth(&payload).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.alias("b"), Some(8));
    }

    #[test]
    fn update_ignores_unknown_paths() {
        let mut snapshot = DeviceSnapshot::new(
            vec![AliasedMetric {
                metric: metric("a", 1),
                alias: 1,
            }],
            None,
        );
        snapshot.update(&[metric("a", 5), metric("z", 9)]);
        assert_eq!(snapshot.metrics().len(), 1);
        assert_eq!(snapshot.metrics()[0].value, Some(Value::Int(5)));
    }
}
