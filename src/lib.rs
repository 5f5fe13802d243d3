//! Wi-Fi RSSI beacon.
//!
//! A node joins the configured network, then reports its link RSSI to a fixed
//! collector as `RX<id>:<rssi>` UDP datagrams, forever. The collector side
//! lives in [`collector`] and the `rssi-collector` binary.

pub mod beacon;
pub mod collector;
pub mod config;
pub mod dmx;
#[cfg(target_os = "espidf")]
pub mod esp;
pub mod join;
pub mod message;
pub mod radio;

#[cfg(test)]
mod testing;

pub use beacon::{Beacon, Cycle, DatagramSink, SendOutcome};
pub use config::NodeConfig;
pub use join::{JoinController, JoinState, Joined};
pub use message::{DecodeError, Report};
pub use radio::{AssociationStatus, Clock, Radio, RSSI_UNAVAILABLE};
