use core::fmt::{self, Write as _};
use std::num::NonZeroU32;
use std::str::FromStr;

use thiserror::Error;

/// Tag every report starts with.
pub const REPORT_TAG: &str = "RX";

/// Longest possible payload: `RX4294967295:-2147483648`.
pub const MAX_PAYLOAD_LEN: usize = 24;

pub type Payload = heapless::String<MAX_PAYLOAD_LEN>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid ASCII text")]
    NotText,

    #[error("payload does not start with \"RX\"")]
    MissingTag,

    #[error("payload has no ':' separator")]
    MissingSeparator,

    #[error("invalid receiver id: {0:?}")]
    InvalidReceiverId(String),

    #[error("invalid rssi: {0:?}")]
    InvalidRssi(String),
}

/// One beacon report: which node, and what it measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub receiver_id: NonZeroU32,
    pub rssi: i32,
}

impl Report {
    pub fn new(receiver_id: NonZeroU32, rssi: i32) -> Self {
        Self { receiver_id, rssi }
    }

    /// Render the wire form, `RX<id>:<rssi>`.
    pub fn encode(&self) -> Payload {
        let mut out = Payload::new();
        // Capacity covers the widest id and rssi, so this cannot overflow.
        let _ = write!(out, "{self}");
        out
    }

    /// Parse one datagram body. Anything besides exactly `RX<id>:<rssi>` is
    /// rejected, including surrounding whitespace.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let text = core::str::from_utf8(datagram)
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or(DecodeError::NotText)?;
        text.parse()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", REPORT_TAG, self.receiver_id, self.rssi)
    }
}

impl FromStr for Report {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(REPORT_TAG).ok_or(DecodeError::MissingTag)?;
        let (id, rssi) = body.split_once(':').ok_or(DecodeError::MissingSeparator)?;

        if !is_decimal(id) {
            return Err(DecodeError::InvalidReceiverId(id.to_string()));
        }
        let receiver_id = id
            .parse::<NonZeroU32>()
            .map_err(|_| DecodeError::InvalidReceiverId(id.to_string()))?;

        let digits = rssi.strip_prefix('-').unwrap_or(rssi);
        if !is_decimal(digits) {
            return Err(DecodeError::InvalidRssi(rssi.to_string()));
        }
        let rssi = rssi
            .parse::<i32>()
            .map_err(|_| DecodeError::InvalidRssi(rssi.to_string()))?;

        Ok(Self { receiver_id, rssi })
    }
}

// `str::parse` also accepts a leading '+', which is not part of the format
fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
