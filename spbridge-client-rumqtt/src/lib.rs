//! Part of [spbridge](https://crates.io/crates/spbridge), a bridge that publishes structured
//! industrial asset data as Sparkplug B.
//!
//! Implements the [spbridge_client::Client] and [spbridge_client::EventLoop] traits over
//! [rumqttc] using MQTT v5.

mod client;
mod options;

pub use client::{Client, EventLoop};
pub use options::{Credentials, MqttOptions, TlsOptions};
