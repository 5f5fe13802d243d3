use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::num::NonZeroU32;
use std::time::Duration;

/// Longest SSID the 802.11 standard allows.
pub const MAX_NETWORK_NAME_LEN: usize = 32;
/// Longest WPA2 passphrase.
pub const MAX_CREDENTIAL_LEN: usize = 64;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings as baked in by `build.rs`, still unparsed.
#[derive(Debug, Clone, Copy)]
pub struct RawSettings<'a> {
    pub wifi_ssid: &'a str,
    pub wifi_pass: &'a str,
    pub collector_addr: &'a str,
    pub collector_port: &'a str,
    pub bind_port: &'a str,
    pub receiver_id: &'a str,
    pub report_interval_ms: &'a str,
    pub join_poll_ms: &'a str,
}

/// Values compiled into this firmware image.
pub const BUILD_SETTINGS: RawSettings<'static> = RawSettings {
    wifi_ssid: env!("BEACON_WIFI_SSID"),
    wifi_pass: env!("BEACON_WIFI_PASS"),
    collector_addr: env!("BEACON_COLLECTOR_ADDR"),
    collector_port: env!("BEACON_COLLECTOR_PORT"),
    bind_port: env!("BEACON_BIND_PORT"),
    receiver_id: env!("BEACON_RECEIVER_ID"),
    report_interval_ms: env!("BEACON_REPORT_INTERVAL_MS"),
    join_poll_ms: env!("BEACON_JOIN_POLL_MS"),
};

/// Identity and destination of one physical node. Built once at startup and
/// handed to the join controller and the beacon.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub network_name: String,
    pub network_credential: String,
    pub collector: SocketAddrV4,
    /// Local UDP port; 0 lets the stack pick one.
    pub bind_port: u16,
    /// Must be unique among nodes reporting to the same collector.
    pub receiver_id: NonZeroU32,
    pub report_interval: Duration,
    pub join_poll_interval: Duration,
}

impl NodeConfig {
    /// Create a configuration with default cadence, binding the same port the
    /// collector listens on.
    pub fn new(
        network_name: impl Into<String>,
        network_credential: impl Into<String>,
        collector: SocketAddrV4,
        receiver_id: NonZeroU32,
    ) -> Result<Self> {
        let config = Self {
            network_name: network_name.into(),
            network_credential: network_credential.into(),
            collector,
            bind_port: collector.port(),
            receiver_id,
            report_interval: DEFAULT_REPORT_INTERVAL,
            join_poll_interval: DEFAULT_JOIN_POLL_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse the settings compiled in from `.env`.
    pub fn from_build_env() -> Result<Self> {
        Self::try_from(BUILD_SETTINGS)
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_join_poll_interval(mut self, interval: Duration) -> Self {
        self.join_poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.network_name.is_empty() {
            bail!("Wi-Fi network name is empty, set BEACON_WIFI_SSID in .env");
        }
        if self.network_name.len() > MAX_NETWORK_NAME_LEN {
            bail!(
                "Wi-Fi network name is {} bytes, at most {} allowed",
                self.network_name.len(),
                MAX_NETWORK_NAME_LEN
            );
        }
        if self.network_credential.is_empty() {
            bail!("Wi-Fi credential is empty, set BEACON_WIFI_PASS in .env");
        }
        if self.network_credential.len() > MAX_CREDENTIAL_LEN {
            bail!("Wi-Fi credential longer than {} bytes", MAX_CREDENTIAL_LEN);
        }
        if self.collector.ip().is_unspecified() {
            bail!("collector address {} is unspecified", self.collector.ip());
        }
        if self.collector.port() == 0 {
            bail!("collector port must be in 1..=65535");
        }
        if self.report_interval.is_zero() {
            bail!("report interval must be non-zero");
        }
        if self.join_poll_interval.is_zero() {
            bail!("join poll interval must be non-zero");
        }
        Ok(())
    }
}

impl TryFrom<RawSettings<'_>> for NodeConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawSettings<'_>) -> Result<Self> {
        let ip: Ipv4Addr = raw
            .collector_addr
            .parse()
            .with_context(|| format!("invalid collector address {:?}", raw.collector_addr))?;
        let port: u16 = raw
            .collector_port
            .parse()
            .with_context(|| format!("invalid collector port {:?}", raw.collector_port))?;
        let bind_port: u16 = raw
            .bind_port
            .parse()
            .with_context(|| format!("invalid bind port {:?}", raw.bind_port))?;
        let receiver_id: NonZeroU32 = raw
            .receiver_id
            .parse()
            .map_err(|_| anyhow!("receiver id must be a positive integer, got {:?}", raw.receiver_id))?;
        let report_ms: u64 = raw
            .report_interval_ms
            .parse()
            .with_context(|| format!("invalid report interval {:?}", raw.report_interval_ms))?;
        let poll_ms: u64 = raw
            .join_poll_ms
            .parse()
            .with_context(|| format!("invalid join poll interval {:?}", raw.join_poll_ms))?;

        let config = Self {
            network_name: raw.wifi_ssid.to_string(),
            network_credential: raw.wifi_pass.to_string(),
            collector: SocketAddrV4::new(ip, port),
            bind_port,
            receiver_id,
            report_interval: Duration::from_millis(report_ms),
            join_poll_interval: Duration::from_millis(poll_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

// Keep the credential out of logs
impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("network_name", &self.network_name)
            .field("network_credential", &"*".repeat(self.network_credential.len()))
            .field("collector", &self.collector)
            .field("bind_port", &self.bind_port)
            .field("receiver_id", &self.receiver_id)
            .field("report_interval", &self.report_interval)
            .field("join_poll_interval", &self.join_poll_interval)
            .finish()
    }
}
