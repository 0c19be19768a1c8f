//! Part of [spbridge](https://crates.io/crates/spbridge), a bridge that publishes structured
//! industrial asset data as Sparkplug B.
//!
//! This library provides the Sparkplug B edge node state machine: node and device births,
//! data and deaths with correct `bdSeq`/`seq` handling, alias based DDATA, rebirth commands and
//! recovery from the birth cache after a restart. It also provides a publisher for retained
//! current value topics.

mod builder;
mod command;
mod error;
mod lifecycle;
mod node;
mod retained;

pub use builder::NodeBuilder;
pub use error::PublishError;
pub use node::SparkplugNode;
pub use retained::{RetainedPublisher, RetainedPublisherConfig};
