//! Telemetry emitter task.
//!
//! A background thread drains the cycle's telemetry hand-off and fans
//! samples out to two sinks: every [`NET_DECIMATION`]th received sample
//! goes to the UDP destination as raw wire bytes, every
//! [`LOG_DECIMATION`]nd is appended to the binary log file (truncated
//! on start). Sink failures are warned about, rate-limited, and never
//! stop the loop; the cyclic side only ever sees the hand-off cell.

use std::fs::File;
use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use strider_common::bridge::Handoff;
use strider_common::telemetry::TelemetrySample;

use crate::config::TelemetryConfig;
use crate::error::ControlError;

/// Every Nth received sample is sent to the UDP sink.
pub const NET_DECIMATION: u64 = 50;

/// Every Nth received sample is appended to the binary log.
pub const LOG_DECIMATION: u64 = 2;

/// Sleep between polls of an empty hand-off.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// A sink warning is emitted on the first failure and then once per
/// this many further failures.
const WARN_EVERY: u64 = 1000;

// ─── Sinks ──────────────────────────────────────────────────────────

/// The two telemetry sinks plus decimation state.
///
/// Separate from the thread loop so decimation is testable without
/// timing.
struct Sinks {
    udp: Option<(UdpSocket, SocketAddr)>,
    log: Option<File>,
    received: u64,
    udp_failures: u64,
    log_failures: u64,
}

impl Sinks {
    /// Open both sinks. A sink that cannot be opened is disabled with a
    /// warning; the emitter runs with whatever remains.
    fn open(config: &TelemetryConfig) -> Self {
        let udp = match open_udp(config) {
            Ok(pair) => Some(pair),
            Err(err) => {
                warn!(%err, "telemetry UDP sink disabled");
                None
            }
        };
        let log = if config.log_enabled {
            match File::create(&config.log_path) {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(path = %config.log_path.display(), %err, "telemetry log sink disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            udp,
            log,
            received: 0,
            udp_failures: 0,
            log_failures: 0,
        }
    }

    /// Route one received sample to the sinks it is due for.
    fn handle(&mut self, sample: &TelemetrySample) {
        self.received += 1;
        let bytes = sample.as_bytes();

        if self.received % NET_DECIMATION == 0 {
            if let Some((socket, dest)) = &self.udp {
                if let Err(err) = socket.send_to(bytes, *dest) {
                    if self.udp_failures % WARN_EVERY == 0 {
                        warn!(%err, failures = self.udp_failures, "telemetry UDP send failed");
                    }
                    self.udp_failures += 1;
                }
            }
        }

        if self.received % LOG_DECIMATION == 0 {
            if let Some(file) = self.log.as_mut() {
                if let Err(err) = file.write_all(bytes) {
                    if self.log_failures % WARN_EVERY == 0 {
                        warn!(%err, failures = self.log_failures, "telemetry log write failed");
                    }
                    self.log_failures += 1;
                }
            }
        }
    }

    fn finish(mut self) {
        if let Some(file) = self.log.as_mut() {
            if let Err(err) = file.flush() {
                warn!(%err, "telemetry log flush failed");
            }
        }
    }
}

fn open_udp(config: &TelemetryConfig) -> std::io::Result<(UdpSocket, SocketAddr)> {
    let socket = UdpSocket::bind(("0.0.0.0", config.local_port))?;
    let dest = (config.dest_addr.as_str(), config.dest_port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            std::io::Error::other(format!("no address for {}", config.dest_addr))
        })?;
    Ok((socket, dest))
}

// ─── Task ───────────────────────────────────────────────────────────

/// Handle to the running emitter thread.
pub struct TelemetryTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TelemetryTask {
    /// Spawn the emitter thread over the given hand-off cell.
    pub fn spawn(
        config: TelemetryConfig,
        samples: Arc<Handoff<TelemetrySample>>,
    ) -> Result<Self, ControlError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || emitter_loop(&config, &samples, &flag))?;
        Ok(Self { stop, handle })
    }

    /// Signal the thread and join it.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("telemetry task panicked");
        }
    }
}

fn emitter_loop(
    config: &TelemetryConfig,
    samples: &Handoff<TelemetrySample>,
    stop: &AtomicBool,
) {
    let mut sinks = Sinks::open(config);
    info!(
        dest_addr = %config.dest_addr,
        dest_port = config.dest_port,
        log_enabled = config.log_enabled,
        "telemetry emitter started"
    );

    while !stop.load(Ordering::Relaxed) {
        match samples.pop() {
            Some(sample) => sinks.handle(&sample),
            None => thread::sleep(IDLE_BACKOFF),
        }
    }

    info!(received = sinks.received, "telemetry emitter stopped");
    sinks.finish();
}

// ─── Tests ──────────────────────────────────────────────────────────
