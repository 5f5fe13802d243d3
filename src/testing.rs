//! Scripted stand-ins for the radio, the socket and the clock.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::Duration;

use crate::beacon::DatagramSink;
use crate::config::NodeConfig;
use crate::radio::{AssociationStatus, Clock, Radio};

pub fn collector_addr() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), 12345)
}

pub fn node_config(receiver_id: u32) -> NodeConfig {
    NodeConfig::new(
        "Beacons",
        "hunter22",
        collector_addr(),
        NonZeroU32::new(receiver_id).unwrap(),
    )
    .unwrap()
}

/// Virtual time shared between the clock and whatever wants to timestamp.
#[derive(Debug, Clone, Default)]
pub struct VirtualTime(Rc<Cell<Duration>>);

impl VirtualTime {
    pub fn now(&self) -> Duration {
        self.0.get()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

/// Clock that advances virtual time instead of blocking.
#[derive(Debug, Default)]
pub struct VirtualClock {
    pub time: VirtualTime,
    pub sleeps: Vec<Duration>,
}

impl Clock for VirtualClock {
    fn sleep(&mut self, period: Duration) {
        self.sleeps.push(period);
        self.time.advance(period);
    }
}

/// Radio that reports "not connected" a fixed number of times, then connects,
/// and replays queued RSSI samples.
#[derive(Debug)]
pub struct ScriptedRadio {
    pub polls_before_connect: u32,
    pub fail_begin: bool,
    pub samples: VecDeque<anyhow::Result<i32>>,
    pub default_sample: i32,
    pub associations: Vec<(String, String)>,
    pub status_polls: u32,
    /// Virtual time spent on each sample, to check cadence is end-relative.
    pub sample_cost: Duration,
    pub time: VirtualTime,
    pub connected: Rc<Cell<bool>>,
}

impl ScriptedRadio {
    pub fn connecting_after(polls: u32) -> Self {
        Self {
            polls_before_connect: polls,
            fail_begin: false,
            samples: VecDeque::new(),
            default_sample: -60,
            associations: Vec::new(),
            status_polls: 0,
            sample_cost: Duration::ZERO,
            time: VirtualTime::default(),
            connected: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_samples(mut self, samples: impl IntoIterator<Item = i32>) -> Self {
        self.samples.extend(samples.into_iter().map(Ok));
        self
    }
}

impl Radio for ScriptedRadio {
    fn begin_association(&mut self, network_name: &str, credential: &str) -> anyhow::Result<()> {
        self.associations
            .push((network_name.to_string(), credential.to_string()));
        if self.fail_begin {
            anyhow::bail!("association rejected");
        }
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        self.status_polls += 1;
        if self.status_polls > self.polls_before_connect {
            self.connected.set(true);
            AssociationStatus::Connected
        } else {
            AssociationStatus::NotConnected
        }
    }

    fn signal_strength(&mut self) -> anyhow::Result<i32> {
        self.time.advance(self.sample_cost);
        self.samples
            .pop_front()
            .unwrap_or(Ok(self.default_sample))
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        self.connected
            .get()
            .then(|| Ipv4Addr::new(192, 168, 1, 42))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub at: Duration,
    pub payload: String,
    pub dest: SocketAddrV4,
}

/// Socket that records every datagram and fails on chosen send attempts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub time: VirtualTime,
    pub sent: Rc<RefCell<Vec<SentDatagram>>>,
    pub fail_attempts: HashSet<usize>,
    pub attempts: usize,
    /// Set by the radio once associated; sends before that are a bug.
    pub connected: Option<Rc<Cell<bool>>>,
}

impl DatagramSink for RecordingSink {
    fn send_datagram(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<usize> {
        let attempt = self.attempts;
        self.attempts += 1;
        if let Some(connected) = &self.connected {
            assert!(connected.get(), "datagram sent before the node joined");
        }
        if self.fail_attempts.contains(&attempt) {
            return Err(io::Error::new(io::ErrorKind::Other, "no buffer space"));
        }
        self.sent.borrow_mut().push(SentDatagram {
            at: self.time.now(),
            payload: String::from_utf8(payload.to_vec()).unwrap(),
            dest,
        });
        Ok(payload.len())
    }
}
