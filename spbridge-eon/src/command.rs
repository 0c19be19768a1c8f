use log::{debug, warn};
use spbridge_client::IncomingMessage;
use spbridge_types::{
    constants::{DEVICE_CONTROL_REBIRTH, NODE_CONTROL_REBIRTH},
    payload::{Message, Payload},
    topic::{DeviceMessage, NodeMessage, SparkplugTopic},
    CommandRequest, ControlValue,
};

/// What a rebirth request asks to be reborn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RebirthTarget {
    Node,
    Device(String),
}

/// Interpret a message received on a command topic.
///
/// Returns the rebirth it requests, or `None` for anything else. A JSON command object is tried
/// first, then a Sparkplug payload carrying the matching rebirth control metric.
pub(crate) fn rebirth_request(
    message: &IncomingMessage,
    group_id: &str,
    node_id: &str,
) -> Option<RebirthTarget> {
    let (target, control_name) = match SparkplugTopic::parse(&message.topic) {
        Ok(SparkplugTopic::Node {
            group_id: g,
            message_type: NodeMessage::NCmd,
            node_id: n,
        }) if g == group_id && n == node_id => (RebirthTarget::Node, NODE_CONTROL_REBIRTH),
        Ok(SparkplugTopic::Device {
            group_id: g,
            message_type: DeviceMessage::DCmd,
            node_id: n,
            device_id,
        }) if g == group_id && n == node_id => {
            (RebirthTarget::Device(device_id), DEVICE_CONTROL_REBIRTH)
        }
        _ => {
            warn!("Ignoring message on unexpected command topic {}", message.topic);
            return None;
        }
    };

    let requested = match CommandRequest::parse(&message.payload) {
        Ok(request) => {
            debug!(
                "JSON command on {} correlation_id={:?} requestor={:?}",
                message.topic, request.correlation_id, request.requestor
            );
            request.is_truthy()
        }
        Err(_) => match Payload::decode(&message.payload[..]) {
            Ok(payload) => payload_requests_rebirth(&payload, control_name),
            Err(e) => {
                warn!("Ignoring undecodable command on {}: {e}", message.topic);
                return None;
            }
        },
    };

    if requested {
        Some(target)
    } else {
        debug!("Command on {} does not request a rebirth", message.topic);
        None
    }
}

fn payload_requests_rebirth(payload: &Payload, control_name: &str) -> bool {
    let Some(metric) = payload
        .metrics
        .iter()
        .find(|m| m.name.as_deref() == Some(control_name))
    else {
        return false;
    };
    match metric.value.as_ref().and_then(ControlValue::from_wire) {
        Some(value) => value.is_truthy(),
        None => {
            warn!("Received invalid {control_name} metric - ignoring request");
            false
        }
    }
}
