//! Part of [spbridge](https://crates.io/crates/spbridge), a bridge that publishes structured
//! industrial asset data as Sparkplug B.
//!
//! This library defines the traits a message bus client implements and the reconnecting
//! [Transport] built on top of them.
//!
//! # Feature Flags
//!
//! - `channel-client`: Enables the channel based [EventLoop] and [Client] implementation. Disabled by default.
//!

mod backoff;
mod error;
mod traits;
mod transport;
mod types;

pub use crate::backoff::Backoff;
pub use error::{ClientError, TransportError};
pub use traits::{Client, DynClient, DynEventLoop, EventLoop};
pub use transport::{
    ConnectionListener, MessageHandler, SubscriptionId, Transport, TransportConfig,
};
pub use types::*;

/// A basic [EventLoop] and [Client] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real MQTT client and broker setup
#[cfg(any(feature = "channel-client", test, doc))]
pub mod channel;
