//! Part of [spbridge](https://crates.io/crates/spbridge), a bridge that publishes structured
//! industrial asset data as Sparkplug B.
//!
//! This crate holds the wire types, the topic grammar and the plain metric model shared by
//! the transport, the durable stores and the edge node state machine.

pub mod constants;

mod generated {
    pub(crate) mod sparkplug_payload;
}

/// generated types
pub mod payload;

pub mod topic;

mod control;
mod metric;
mod property_set;
mod value;

pub mod retained;
pub mod utils;

pub use control::*;
pub use metric::*;
pub use property_set::*;
pub use value::*;
