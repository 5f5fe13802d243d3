//! DMX512 output for a moving head driven by the collector's position.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

pub const DMX_CHANNELS: usize = 512;
/// Start code plus one byte per channel.
pub const DMX_FRAME_LEN: usize = DMX_CHANNELS + 1;
pub const DMX_START_CODE: u8 = 0;
/// Line settings are fixed by DMX512: 250 kbaud, 8N2.
pub const DMX_BAUD_RATE: u32 = 250_000;

pub const PAN_CHANNEL: usize = 0;
pub const TILT_CHANNEL: usize = 1;

const BREAK_TIME: Duration = Duration::from_millis(1);
const MARK_AFTER_BREAK: Duration = Duration::from_millis(1);

/// Channel levels of one universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxUniverse {
    channels: [u8; DMX_CHANNELS],
}

impl Default for DmxUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxUniverse {
    pub fn new() -> Self {
        Self {
            channels: [0; DMX_CHANNELS],
        }
    }

    /// Panics if `channel` is not below [`DMX_CHANNELS`].
    pub fn set(&mut self, channel: usize, level: u8) {
        self.channels[channel] = level;
    }

    pub fn get(&self, channel: usize) -> Option<u8> {
        self.channels.get(channel).copied()
    }

    pub fn set_pan_tilt(&mut self, pan: u8, tilt: u8) {
        self.set(PAN_CHANNEL, pan);
        self.set(TILT_CHANNEL, tilt);
    }

    /// Wire frame: start code, then every channel in order.
    pub fn frame(&self) -> [u8; DMX_FRAME_LEN] {
        let mut frame = [0u8; DMX_FRAME_LEN];
        frame[0] = DMX_START_CODE;
        frame[1..].copy_from_slice(&self.channels);
        frame
    }
}

/// Serial line able to hold a break condition, which marks a frame start.
pub trait DmxLine: Write {
    fn set_break(&mut self, on: bool) -> io::Result<()>;
}

/// Break, mark-after-break, then the frame bytes.
pub fn send_frame<L: DmxLine>(line: &mut L, frame: &[u8; DMX_FRAME_LEN]) -> io::Result<()> {
    line.set_break(true)?;
    thread::sleep(BREAK_TIME);
    line.set_break(false)?;
    thread::sleep(MARK_AFTER_BREAK);
    line.write_all(frame)?;
    line.flush()
}

/// A universe bound to the line it is sent on.
#[derive(Debug)]
pub struct DmxOutput<L> {
    line: L,
    universe: DmxUniverse,
}

impl<L: DmxLine> DmxOutput<L> {
    pub fn new(line: L) -> Self {
        Self {
            line,
            universe: DmxUniverse::new(),
        }
    }

    pub fn universe(&self) -> &DmxUniverse {
        &self.universe
    }

    /// Update pan and tilt, then send the whole universe.
    pub fn send_pan_tilt(&mut self, pan: u8, tilt: u8) -> io::Result<()> {
        self.universe.set_pan_tilt(pan, tilt);
        send_frame(&mut self.line, &self.universe.frame())
    }
}

#[cfg(not(target_os = "espidf"))]
mod serial {
    use anyhow::{Context, Result};
    use serialport::{DataBits, Parity, SerialPort, StopBits};
    use std::io;
    use std::time::Duration;

    use super::{DmxLine, DmxOutput, DMX_BAUD_RATE};

    impl DmxLine for Box<dyn SerialPort> {
        fn set_break(&mut self, on: bool) -> io::Result<()> {
            let port: &dyn SerialPort = &**self;
            let result = if on {
                port.set_break()
            } else {
                port.clear_break()
            };
            result.map_err(io::Error::from)
        }
    }

    /// Open a USB-DMX interface at `path` with DMX512 line settings.
    pub fn open_serial(path: &str) -> Result<DmxOutput<Box<dyn SerialPort>>> {
        let port = serialport::new(path, DMX_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| format!("failed to open DMX interface {path}"))?;
        Ok(DmxOutput::new(port))
    }
}

#[cfg(not(target_os = "espidf"))]
pub use serial::open_serial;
