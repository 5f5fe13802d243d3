use std::net::Ipv4Addr;
use std::time::Duration;

/// Reported in place of a measurement when the radio has none.
/// Physical RSSI readings are never positive, so 127 cannot collide with one.
pub const RSSI_UNAVAILABLE: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStatus {
    Connected,
    NotConnected,
}

/// Link layer the beacon runs on.
pub trait Radio {
    /// Ask the radio to associate with `network_name`. Returns once the request
    /// is issued, not when the association completes.
    fn begin_association(&mut self, network_name: &str, credential: &str) -> anyhow::Result<()>;

    fn association_status(&mut self) -> AssociationStatus;

    /// RSSI of the current link in dBm.
    fn signal_strength(&mut self) -> anyhow::Result<i32>;

    /// Address assigned to this node, if any. Diagnostic only.
    fn local_address(&mut self) -> Option<Ipv4Addr>;
}

/// Time source for both blocking waits.
pub trait Clock {
    fn sleep(&mut self, period: Duration);
}
