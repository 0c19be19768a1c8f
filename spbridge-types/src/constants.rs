use crate::topic::QoS;

pub const SPBV01: &str = "spBv1.0";

pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";
pub const DEVICE_CONTROL_REBIRTH: &str = "Device Control/Rebirth";
pub const BDSEQ: &str = "bdSeq";

pub const NBIRTH: &str = "NBIRTH";
pub const NDEATH: &str = "NDEATH";
pub const NDATA: &str = "NDATA";
pub const NCMD: &str = "NCMD";

pub const DBIRTH: &str = "DBIRTH";
pub const DDEATH: &str = "DDEATH";
pub const DDATA: &str = "DDATA";
pub const DCMD: &str = "DCMD";

/// Property set key carrying a metric's engineering unit in birth messages.
pub const PROPERTY_ENG_UNIT: &str = "engUnit";
/// Property set key carrying a metric's semantic identifier in birth messages.
pub const PROPERTY_SEMANTIC_ID: &str = "semanticId";
/// Property set key carrying the source document a device birth was derived from.
pub const PROPERTY_SOURCE: &str = "source";

/// Every Sparkplug message is published with this QoS.
///
/// Consumers rely on it, so it is not configurable.
pub const SPARKPLUG_QOS: QoS = QoS::AtMostOnce;
/// Sparkplug messages are never retained.
pub const SPARKPLUG_RETAIN: bool = false;
