//! # spbridge
//!
//! The core of a bridge that publishes structured industrial asset data as Sparkplug B.
//!
//! - [client] holds the reconnecting [client::Transport] and the traits a message bus client
//!   implements. With the `rumqtt-client` feature an MQTT v5 implementation over `rumqttc` is
//!   available as [client::mqtt_client::rumqtt].
//! - [eon] holds the Sparkplug edge node state machine and the retained current value publisher.
//! - [store] holds the durable alias registry, birth cache and dedup store.
//! - [types] holds the Sparkplug wire types, topics and the metric data model.
//!
//! # Feature Flags
//!
//! - `eon`: Enables the edge node. Enabled by default.
//! - `rumqtt-client`: Enables the `rumqttc` based client. Enabled by default.

#[cfg(feature = "eon")]
pub use spbridge_eon as eon;
pub use spbridge_store as store;
pub use spbridge_types as types;

pub mod client {
    pub use spbridge_client::*;

    pub mod mqtt_client {
        #[cfg(feature = "rumqtt-client")]
        pub use spbridge_client_rumqtt as rumqtt;
    }
}
