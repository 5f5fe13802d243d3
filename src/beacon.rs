use anyhow::Context;
use log::{debug, info, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::config::NodeConfig;
use crate::message::{Payload, Report};
use crate::radio::{Clock, Radio, RSSI_UNAVAILABLE};

/// Outbound datagram transport.
pub trait DatagramSink {
    fn send_datagram(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<usize>;
}

impl DatagramSink for UdpSocket {
    fn send_datagram(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<usize> {
        self.send_to(payload, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(usize),
    /// The stack refused the datagram. Nothing is retried.
    Dropped(io::ErrorKind),
}

/// What one transmit cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub report: Report,
    pub payload: Payload,
    pub outcome: SendOutcome,
}

/// Periodic RSSI reporter. Every cycle is independent: sample, encode, send,
/// forget.
#[derive(Debug)]
pub struct Beacon<'a, S> {
    config: &'a NodeConfig,
    socket: S,
    sent: u64,
    dropped: u64,
}

impl<'a> Beacon<'a, UdpSocket> {
    /// Bind the outbound UDP socket on `config.bind_port`.
    pub fn bind(config: &'a NodeConfig) -> anyhow::Result<Self> {
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.bind_port);
        let socket =
            UdpSocket::bind(local).with_context(|| format!("failed to bind UDP socket on {local}"))?;
        info!(
            "UDP socket bound on {}, reporting to {}",
            socket.local_addr()?,
            config.collector
        );
        Ok(Self::new(config, socket))
    }
}

impl<'a, S: DatagramSink> Beacon<'a, S> {
    pub fn new(config: &'a NodeConfig, socket: S) -> Self {
        Self {
            config,
            socket,
            sent: 0,
            dropped: 0,
        }
    }

    /// Sample, encode and send once. Never fails: a missing sample becomes
    /// [`RSSI_UNAVAILABLE`] and a failed send is recorded in the result.
    pub fn cycle<R: Radio>(&mut self, radio: &mut R) -> Cycle {
        let rssi = radio.signal_strength().unwrap_or_else(|e| {
            warn!("RSSI unavailable, reporting {}: {:?}", RSSI_UNAVAILABLE, e);
            RSSI_UNAVAILABLE
        });

        let report = Report::new(self.config.receiver_id, rssi);
        let payload = report.encode();

        let outcome = match self
            .socket
            .send_datagram(payload.as_bytes(), self.config.collector)
        {
            Ok(n) => {
                self.sent += 1;
                SendOutcome::Sent(n)
            }
            Err(e) => {
                self.dropped += 1;
                debug!("Report to {} dropped: {}", self.config.collector, e);
                SendOutcome::Dropped(e.kind())
            }
        };

        info!("{}", payload);

        Cycle {
            report,
            payload,
            outcome,
        }
    }

    /// One cycle followed by the report interval. The wait starts when the
    /// cycle ends, so time spent sampling and sending adds to the spacing.
    pub fn tick<R: Radio, C: Clock>(&mut self, radio: &mut R, clock: &mut C) -> Cycle {
        let cycle = self.cycle(radio);
        clock.sleep(self.config.report_interval);
        cycle
    }

    pub fn run<R: Radio, C: Clock>(mut self, radio: &mut R, clock: &mut C) -> ! {
        info!(
            "Beacon RX{} reporting every {:?}",
            self.config.receiver_id, self.config.report_interval
        );
        loop {
            self.tick(radio, clock);
        }
    }

    /// Datagrams handed to the stack so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Datagrams the stack refused so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
