//! Connection state, health and throughput accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Serialize, Serializer};
use tokio::time::Instant;

/// Lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Reserved for callers that drive their own reconnect policy.
    Reconnecting = 3,
    Faulted = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Faulted,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `state` and return the previous one.
    pub(crate) fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

/// Point-in-time view of link health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHealthSnapshot {
    pub state: ConnectionState,
    pub consecutive_timeouts: u32,
    /// Time since the last received byte; `None` before the first byte of the session.
    #[serde(rename = "last_seen_age_ms", serialize_with = "opt_millis")]
    pub last_seen_age: Option<Duration>,
    pub last_error: Option<String>,
}

/// Point-in-time view of link throughput and error counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkMetricsSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub tx_frames: u64,
    pub crc_failures: u64,
    /// Decode failures other than checksum mismatches.
    pub framing_errors: u64,
    pub seq_misses: u64,
    pub command_timeouts: u64,
    /// Unsolicited frames evicted from the telemetry queue.
    pub telemetry_dropped: u64,
    pub pending_requests: usize,
    pub last_rx_utc: Option<SystemTime>,
    pub last_tx_utc: Option<SystemTime>,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub rx_frames_per_sec: f64,
}

fn opt_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        None => serializer.serialize_none(),
    }
}

/// Lock-free session counters.
///
/// Timestamps are stored as nanoseconds since `base` plus one, so that zero
/// can mean "never".
#[derive(Debug)]
pub(crate) struct Metrics {
    base: Instant,
    base_utc: SystemTime,
    session_start: AtomicU64,
    last_rx: AtomicU64,
    last_tx: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_frames: AtomicU64,
    tx_frames: AtomicU64,
    crc_failures: AtomicU64,
    framing_errors: AtomicU64,
    seq_misses: AtomicU64,
    command_timeouts: AtomicU64,
    telemetry_dropped: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        let metrics = Self {
            base: Instant::now(),
            base_utc: SystemTime::now(),
            session_start: AtomicU64::new(0),
            last_rx: AtomicU64::new(0),
            last_tx: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            rx_frames: AtomicU64::new(0),
            tx_frames: AtomicU64::new(0),
            crc_failures: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            seq_misses: AtomicU64::new(0),
            command_timeouts: AtomicU64::new(0),
            telemetry_dropped: AtomicU64::new(0),
        };
        metrics.reset();
        metrics
    }

    fn now(&self) -> u64 {
        u64::try_from(self.base.elapsed().as_nanos())
            .unwrap_or(u64::MAX - 1)
            .saturating_add(1)
    }

    fn to_utc(&self, stamp: u64) -> Option<SystemTime> {
        (stamp != 0).then(|| self.base_utc + Duration::from_nanos(stamp - 1))
    }

    /// Zero every counter and restart the rate window.
    pub(crate) fn reset(&self) {
        for counter in [
            &self.last_rx,
            &self.last_tx,
            &self.rx_bytes,
            &self.tx_bytes,
            &self.rx_frames,
            &self.tx_frames,
            &self.crc_failures,
            &self.framing_errors,
            &self.seq_misses,
            &self.command_timeouts,
            &self.telemetry_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.session_start.store(self.now(), Ordering::Relaxed);
    }

    pub(crate) fn record_rx_bytes(&self, n: usize) {
        self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
        self.last_rx.store(self.now(), Ordering::Release);
    }

    pub(crate) fn record_rx_frame(&self) {
        self.rx_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tx_frame(&self, n: usize) {
        self.tx_bytes.fetch_add(n as u64, Ordering::Relaxed);
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
        self.last_tx.store(self.now(), Ordering::Release);
    }

    pub(crate) fn record_crc_failure(&self) {
        self.crc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_seq_misses(&self, n: u64) {
        self.seq_misses.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_command_timeout(&self) {
        self.command_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_telemetry_dropped(&self) {
        self.telemetry_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last received byte, if any byte was received this session.
    pub(crate) fn last_rx_age(&self) -> Option<Duration> {
        let last = self.last_rx.load(Ordering::Acquire);
        (last != 0).then(|| Duration::from_nanos(self.now().saturating_sub(last)))
    }

    pub(crate) fn snapshot(&self, pending_requests: usize) -> LinkMetricsSnapshot {
        let elapsed_ns = self
            .now()
            .saturating_sub(self.session_start.load(Ordering::Relaxed));
        let secs = (elapsed_ns as f64 / 1e9).max(1.0);

        let rx_bytes = self.rx_bytes.load(Ordering::Relaxed);
        let tx_bytes = self.tx_bytes.load(Ordering::Relaxed);
        let rx_frames = self.rx_frames.load(Ordering::Relaxed);

        LinkMetricsSnapshot {
            rx_bytes,
            tx_bytes,
            rx_frames,
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            crc_failures: self.crc_failures.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            seq_misses: self.seq_misses.load(Ordering::Relaxed),
            command_timeouts: self.command_timeouts.load(Ordering::Relaxed),
            telemetry_dropped: self.telemetry_dropped.load(Ordering::Relaxed),
            pending_requests,
            last_rx_utc: self.to_utc(self.last_rx.load(Ordering::Acquire)),
            last_tx_utc: self.to_utc(self.last_tx.load(Ordering::Acquire)),
            rx_bytes_per_sec: rx_bytes as f64 / secs,
            tx_bytes_per_sec: tx_bytes as f64 / secs,
            rx_frames_per_sec: rx_frames as f64 / secs,
        }
    }
}
