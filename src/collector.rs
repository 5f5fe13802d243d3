//! Receiving side: attributes incoming reports to their node, turns RSSI
//! into rough distances and, given a receiver pair, a position that can steer
//! a DMX moving head.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::num::NonZeroU32;
use std::time::Instant;

use crate::dmx::{DmxLine, DmxOutput};
use crate::message::{DecodeError, Report};
use crate::radio::RSSI_UNAVAILABLE;

/// Largest datagram the collector reads; real reports are far shorter.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Reading a node would see one metre from its AP, in dBm.
pub const RSSI_REF: f32 = -30.0;
/// Indoor log-distance exponent; 2 is free space, walls push it towards 4.
pub const PATH_LOSS_EXPONENT: f32 = 3.0;

/// Carrier frequency assumed by the free-space model, in MHz.
pub const CARRIER_MHZ: f64 = 2400.0;
/// Free-space path loss constant for distance in metres and frequency in MHz.
const FSPL_CONSTANT_DB: f64 = 27.55;

/// Position span, in metres, mapped onto the full 0..=255 pan and tilt range.
pub const PAN_TILT_SPAN_M: f64 = 10.0;

/// `10^((RSSI_REF - rssi) / (10 * PATH_LOSS_EXPONENT))` metres.
pub fn log_distance_m(rssi: i32) -> f32 {
    let exponent = (RSSI_REF - rssi as f32) / (10.0 * PATH_LOSS_EXPONENT);
    10.0_f32.powf(exponent)
}

/// Free-space path loss inverted for distance at [`CARRIER_MHZ`]:
/// `10^((27.55 - 20*log10(f) + |rssi|) / 20)` metres.
pub fn free_space_distance_m(rssi: i32) -> f64 {
    let loss = FSPL_CONSTANT_DB - 20.0 * CARRIER_MHZ.log10() + f64::from(rssi.unsigned_abs());
    10.0_f64.powf(loss / 20.0)
}

/// Coarse range label for the collector log.
pub fn classify_distance(distance: f32) -> &'static str {
    match distance {
        d if d < 1.0 => "Very Close (<1m)",
        d if d < 5.0 => "Close (1-5m)",
        d if d < 15.0 => "Medium (5-15m)",
        d if d < 50.0 => "Far (15-50m)",
        _ => "Very Far (>50m)",
    }
}

/// Distance figures derived from one report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub distance_m: f32,
    pub range: &'static str,
    pub free_space_m: f64,
}

impl Estimate {
    /// `None` for [`RSSI_UNAVAILABLE`], which is not a measurement.
    pub fn from_rssi(rssi: i32) -> Option<Self> {
        if rssi == RSSI_UNAVAILABLE {
            return None;
        }
        let distance_m = log_distance_m(rssi);
        Some(Self {
            distance_m,
            range: classify_distance(distance_m),
            free_space_m: free_space_distance_m(rssi),
        })
    }
}

/// Parse the `--pair` ids: none, or exactly two different ones.
pub fn receiver_pair(ids: &[NonZeroU32]) -> Result<Option<(NonZeroU32, NonZeroU32)>> {
    match ids {
        [] => Ok(None),
        [a, b] if a != b => Ok(Some((*a, *b))),
        _ => bail!("--pair needs two different receiver ids, got {:?}", ids),
    }
}

/// Position of the tracked transmitter relative to a pair of receivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// `x` is the mean of the two free-space distances, `y` half their
    /// difference.
    pub fn from_pair(rssi_a: i32, rssi_b: i32) -> Self {
        let d1 = free_space_distance_m(rssi_a);
        let d2 = free_space_distance_m(rssi_b);
        Self {
            x: (d1 + d2) / 2.0,
            y: (d1 - d2) / 2.0,
        }
    }

    /// Pan from `x`, tilt from `y`, both scaled so [`PAN_TILT_SPAN_M`] is
    /// full travel and clipped to 0..=255.
    pub fn to_pan_tilt(&self) -> (u8, u8) {
        (scale_to_dmx(self.x), scale_to_dmx(self.y))
    }
}

// Truncates like the lighting desk expects; NaN ends up at 0
fn scale_to_dmx(metres: f64) -> u8 {
    (metres * 255.0 / PAN_TILT_SPAN_M).clamp(0.0, 255.0) as u8
}

/// Latest known state of one beacon node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverState {
    pub rssi: i32,
    pub source: SocketAddr,
    pub reports: u64,
    pub last_seen: Instant,
}

impl ReceiverState {
    /// Whether the last report carried a real measurement.
    pub fn has_signal(&self) -> bool {
        self.rssi != RSSI_UNAVAILABLE
    }
}

/// Demultiplexes reports by receiver id.
#[derive(Debug, Default)]
pub struct Collector {
    receivers: BTreeMap<NonZeroU32, ReceiverState>,
    rejected: u64,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one datagram and record it under its receiver id.
    pub fn ingest(
        &mut self,
        datagram: &[u8],
        source: SocketAddr,
        now: Instant,
    ) -> Result<Report, DecodeError> {
        let report = match Report::decode(datagram) {
            Ok(report) => report,
            Err(e) => {
                self.rejected += 1;
                return Err(e);
            }
        };

        self.receivers
            .entry(report.receiver_id)
            .and_modify(|state| {
                if state.source != source {
                    warn!(
                        "RX{} now reporting from {} (was {}), is the id unique?",
                        report.receiver_id, source, state.source
                    );
                }
                state.rssi = report.rssi;
                state.source = source;
                state.reports += 1;
                state.last_seen = now;
            })
            .or_insert_with(|| {
                info!("New receiver RX{} at {}", report.receiver_id, source);
                ReceiverState {
                    rssi: report.rssi,
                    source,
                    reports: 1,
                    last_seen: now,
                }
            });

        Ok(report)
    }

    pub fn receiver(&self, id: NonZeroU32) -> Option<&ReceiverState> {
        self.receivers.get(&id)
    }

    /// All known receivers, ordered by id.
    pub fn receivers(&self) -> impl Iterator<Item = (NonZeroU32, &ReceiverState)> {
        self.receivers.iter().map(|(id, state)| (*id, state))
    }

    /// Datagrams that did not decode.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Position from the latest samples of receivers `a` and `b`, when both
    /// have reported a real measurement.
    pub fn position(&self, a: NonZeroU32, b: NonZeroU32) -> Option<Position> {
        let a = self.receiver(a).filter(|s| s.has_signal())?;
        let b = self.receiver(b).filter(|s| s.has_signal())?;
        Some(Position::from_pair(a.rssi, b.rssi))
    }

    /// Block for one datagram and ingest it.
    pub fn receive_one(&mut self, socket: &UdpSocket) -> Result<Report> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (n, source) = socket
            .recv_from(&mut buf)
            .context("failed to receive datagram")?;
        let report = self
            .ingest(&buf[..n], source, Instant::now())
            .with_context(|| format!("malformed report from {}", source))?;
        Ok(report)
    }

    /// Log one ingested report and, when both receivers of `pair` have a
    /// real sample, the position, which is also pushed to `dmx`.
    pub fn report<L: DmxLine>(
        &self,
        report: &Report,
        pair: Option<(NonZeroU32, NonZeroU32)>,
        dmx: Option<&mut DmxOutput<L>>,
    ) -> Option<Position> {
        match Estimate::from_rssi(report.rssi) {
            Some(e) => info!(
                "RX{} | RSSI: {}dBm | Distance: {:.1}m | Range: {} | Free space: {:.2}m",
                report.receiver_id, report.rssi, e.distance_m, e.range, e.free_space_m
            ),
            None => info!("RX{}: no signal measurement", report.receiver_id),
        }

        let (a, b) = pair?;
        let Some(position) = self.position(a, b) else {
            debug!("Waiting for reports from both RX{} and RX{}", a, b);
            return None;
        };
        let (pan, tilt) = position.to_pan_tilt();
        info!(
            "Position RX{}/RX{}: X: {:.2}, Y: {:.2} -> pan {}, tilt {}",
            a, b, position.x, position.y, pan, tilt
        );

        if let Some(dmx) = dmx {
            if let Err(e) = dmx.send_pan_tilt(pan, tilt) {
                warn!("DMX frame not sent: {}", e);
            }
        }
        Some(position)
    }

    /// Receive forever. Bad datagrams and receive errors are logged and
    /// skipped.
    pub fn serve<L: DmxLine>(
        &mut self,
        socket: &UdpSocket,
        pair: Option<(NonZeroU32, NonZeroU32)>,
        mut dmx: Option<DmxOutput<L>>,
    ) -> ! {
        loop {
            match self.receive_one(socket) {
                Ok(report) => {
                    self.report(&report, pair, dmx.as_mut());
                }
                Err(e) => warn!("{:#}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::Beacon;
    use crate::config::NodeConfig;
    use crate::dmx::tests::RecordingLine;
    use crate::dmx::{PAN_CHANNEL, TILT_CHANNEL};
    use crate::testing::ScriptedRadio;
    use std::time::Duration;

    fn id(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 50], port))
    }

    #[test]
    fn test_log_distance_grows_with_weaker_signal() {
        assert!((log_distance_m(RSSI_REF as i32) - 1.0).abs() < 1e-6);
        // every 30 dB below the reference is another factor of ten
        assert!((log_distance_m(-60) - 10.0).abs() < 1e-3);
        assert!((log_distance_m(-90) - 100.0).abs() < 1e-2);
        let readings = [-35, -50, -65, -80, -95];
        assert!(readings
            .windows(2)
            .all(|w| log_distance_m(w[0]) < log_distance_m(w[1])));
    }

    #[test]
    fn test_range_labels_at_boundaries() {
        assert_eq!(classify_distance(0.99), "Very Close (<1m)");
        assert_eq!(classify_distance(1.0), "Close (1-5m)");
        assert_eq!(classify_distance(5.0), "Medium (5-15m)");
        assert_eq!(classify_distance(15.0), "Far (15-50m)");
        assert_eq!(classify_distance(50.0), "Very Far (>50m)");
        assert_eq!(classify_distance(log_distance_m(-60)), "Medium (5-15m)");
    }

    #[test]
    fn test_estimate_skips_unavailable_sentinel() {
        assert_eq!(Estimate::from_rssi(RSSI_UNAVAILABLE), None);

        let e = Estimate::from_rssi(-60).unwrap();
        assert!((e.distance_m - 10.0).abs() < 1e-3);
        assert_eq!(e.range, "Medium (5-15m)");
        assert_eq!(e.free_space_m, free_space_distance_m(-60));
        // positive readings other than the sentinel are still estimated
        assert!(Estimate::from_rssi(0).is_some());
    }

    #[test]
    fn test_free_space_distance() {
        // 27.55 - 20*log10(2400) is about -40.05 dB
        assert!((free_space_distance_m(-60) - 9.94).abs() < 0.01);
        assert!(free_space_distance_m(-70) > free_space_distance_m(-60));
        // sign of the reading is ignored
        assert_eq!(free_space_distance_m(-55), free_space_distance_m(55));
    }

    #[test]
    fn test_position_from_equal_pair_is_centred() {
        let p = Position::from_pair(-60, -60);
        assert!((p.x - free_space_distance_m(-60)).abs() < 1e-9);
        assert_eq!(p.y, 0.0);
        assert!(Position::from_pair(-70, -50).y > 0.0);
    }

    #[test]
    fn test_pan_tilt_scaling_and_clipping() {
        assert_eq!(Position { x: 0.0, y: 0.0 }.to_pan_tilt(), (0, 0));
        assert_eq!(Position { x: 5.0, y: 2.0 }.to_pan_tilt(), (127, 51));
        assert_eq!(Position { x: 10.0, y: 10.0 }.to_pan_tilt(), (255, 255));
        assert_eq!(Position { x: 42.0, y: -3.0 }.to_pan_tilt(), (255, 0));
        assert_eq!(Position { x: f64::NAN, y: -0.01 }.to_pan_tilt(), (0, 0));
        // free-space distances at -60 dBm are about 9.9 m, just short of full pan
        assert_eq!(Position::from_pair(-60, -60).to_pan_tilt(), (253, 0));
    }

    #[test]
    fn test_receiver_pair() {
        assert_eq!(receiver_pair(&[]).unwrap(), None);
        assert_eq!(receiver_pair(&[id(1), id(2)]).unwrap(), Some((id(1), id(2))));
        assert!(receiver_pair(&[id(1)]).is_err());
        assert!(receiver_pair(&[id(3), id(3)]).is_err());
        assert!(receiver_pair(&[id(1), id(2), id(3)]).is_err());
    }

    #[test]
    fn test_ingest_demultiplexes_by_id() {
        let mut collector = Collector::new();
        let now = Instant::now();

        collector.ingest(b"RX1:-40", addr(1000), now).unwrap();
        collector.ingest(b"RX2:-70", addr(2000), now).unwrap();
        collector.ingest(b"RX1:-45", addr(1000), now).unwrap();

        let rx1 = collector.receiver(id(1)).unwrap();
        assert_eq!((rx1.rssi, rx1.reports), (-45, 2));
        let rx2 = collector.receiver(id(2)).unwrap();
        assert_eq!((rx2.rssi, rx2.source), (-70, addr(2000)));
        let ids: Vec<u32> = collector.receivers().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn test_ingest_rejects_malformed() {
        let mut collector = Collector::new();
        let now = Instant::now();

        assert_eq!(
            collector.ingest(b"hello", addr(1000), now),
            Err(DecodeError::MissingTag)
        );
        assert!(collector.ingest(b"RX1:abc", addr(1000), now).is_err());
        assert_eq!(collector.rejected(), 2);
        assert_eq!(collector.receivers().count(), 0);
    }

    #[test]
    fn test_position_needs_both_real_samples() {
        let mut collector = Collector::new();
        let now = Instant::now();

        collector.ingest(b"RX1:-60", addr(1000), now).unwrap();
        assert_eq!(collector.position(id(1), id(2)), None);

        collector.ingest(b"RX2:127", addr(2000), now).unwrap();
        assert_eq!(collector.position(id(1), id(2)), None);

        collector.ingest(b"RX2:-60", addr(2000), now).unwrap();
        assert_eq!(
            collector.position(id(1), id(2)),
            Some(Position::from_pair(-60, -60))
        );
    }

    #[test]
    fn test_two_nodes_share_one_collector() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let dest = match socket.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            other => panic!("unexpected address {other}"),
        };

        let node = |rx: u32| -> NodeConfig {
            NodeConfig::new("Beacons", "hunter22", dest, id(rx))
                .unwrap()
                .with_bind_port(0)
        };
        let (config_a, config_b) = (node(1), node(2));
        let mut beacon_a = Beacon::bind(&config_a).unwrap();
        let mut beacon_b = Beacon::bind(&config_b).unwrap();
        let mut radio = ScriptedRadio::connecting_after(0).with_samples([-52, -52]);

        beacon_a.cycle(&mut radio);
        beacon_b.cycle(&mut radio);

        let mut collector = Collector::new();
        let mut seen = vec![
            collector.receive_one(&socket).unwrap(),
            collector.receive_one(&socket).unwrap(),
        ];
        seen.sort_by_key(|r| r.receiver_id);

        assert_eq!(seen, [Report::new(id(1), -52), Report::new(id(2), -52)]);
        assert_ne!(
            collector.receiver(id(1)).unwrap().source,
            collector.receiver(id(2)).unwrap().source
        );
    }

    #[test]
    fn test_receive_skips_bad_datagram_then_ingests_next() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = socket.local_addr().unwrap();
        sender.send_to(b"Verbinde mit WiFi...", dest).unwrap();
        sender.send_to(b"RX4:-58", dest).unwrap();

        let mut collector = Collector::new();
        let err = collector.receive_one(&socket).unwrap_err();
        assert!(format!("{:#}", err).contains("malformed report"));
        assert_eq!(collector.rejected(), 1);

        let report = collector.receive_one(&socket).unwrap();
        assert_eq!(report, Report::new(id(4), -58));
        assert_eq!(collector.receiver(id(4)).unwrap().reports, 1);
    }

    #[test]
    fn test_report_drives_dmx_once_pair_is_known() {
        let mut collector = Collector::new();
        let mut dmx = DmxOutput::new(RecordingLine::default());
        let pair = Some((id(1), id(2)));
        let now = Instant::now();

        let first = collector.ingest(b"RX1:-60", addr(1000), now).unwrap();
        assert_eq!(collector.report(&first, pair, Some(&mut dmx)), None);
        assert_eq!(dmx.universe().get(PAN_CHANNEL), Some(0));

        let second = collector.ingest(b"RX2:-60", addr(2000), now).unwrap();
        let position = collector.report(&second, pair, Some(&mut dmx)).unwrap();

        assert_eq!(position, Position::from_pair(-60, -60));
        assert_eq!(dmx.universe().get(PAN_CHANNEL), Some(253));
        assert_eq!(dmx.universe().get(TILT_CHANNEL), Some(0));
    }

    #[test]
    fn test_report_without_pair_leaves_dmx_alone() {
        let mut collector = Collector::new();
        let mut dmx = DmxOutput::new(RecordingLine::default());
        let now = Instant::now();

        collector.ingest(b"RX1:-40", addr(1000), now).unwrap();
        let report = collector.ingest(b"RX2:-70", addr(2000), now).unwrap();

        assert_eq!(collector.report(&report, None, Some(&mut dmx)), None);
        assert_eq!(dmx.universe(), &crate::dmx::DmxUniverse::new());
    }
}
