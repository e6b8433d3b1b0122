//! Fixed-cadence UDP transmitter
//!
//! The transmitter is a typestate machine:
//!
//! ```text
//! Idle ──open──► Streaming ──cancel──► Stopping ──close──► TransmitStats
//!   │
//!   └─ socket/resolve failure: logged once, loop never runs
//! ```
//!
//! While streaming, each tick copies the wire snapshot, encodes it and sends one
//! datagram. Send failures never end the loop: they are logged at most once per
//! interval, the link is reported down, and the next tick tries again.

use super::codec::{self, CodecError, Encoded, PACKET_SIZE};
use crate::config::NetworkConfig;
use crate::controller::state::SharedInputState;
use crate::error::FailureKind;
use crate::events::{EventPublisher, LinkStatus, PipelineEvent};
use crate::timing::{Cadence, RateLimiter};
use crate::worker::WorkerHandle;
use statum::{machine, state};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DETAILED_PACKET_LOGS: u64 = 5;
const PACKET_LOG_EVERY: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct TransmitSettings {
    pub host: String,
    pub port: u16,
    pub transmit_hz: u32,
    pub send_timeout: Duration,
    pub error_log_interval: Duration,
    pub heartbeat_packets: u64,
    pub neutral_fallback: bool,
}

impl Default for TransmitSettings {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for TransmitSettings {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            transmit_hz: config.transmit_hz,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            error_log_interval: Duration::from_millis(config.error_log_interval_ms),
            heartbeat_packets: config.heartbeat_packets,
            neutral_fallback: config.neutral_fallback,
        }
    }
}

impl TransmitSettings {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("Failed to resolve {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("UDP socket creation failed: {0}")]
    Socket(#[source] io::Error),

    #[error("UDP send timed out: {0}")]
    Timeout(#[source] io::Error),

    #[error("UDP send error: {0}")]
    Send(#[source] io::Error),
}

impl TransmitError {
    pub fn from_send(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransmitError::Timeout(error),
            _ => TransmitError::Send(error),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TransmitError::Resolve { .. } | TransmitError::Socket(_) => FailureKind::SocketCreate,
            TransmitError::Timeout(_) | TransmitError::Send(_) => FailureKind::Send,
        }
    }
}

/// Where datagrams go
pub trait DatagramSink: Send {
    fn send(&mut self, packet: &[u8]) -> io::Result<usize>;
}

/// UDP socket on an ephemeral local port, aimed at one target
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    pub fn connect(host: &str, port: u16, send_timeout: Duration) -> Result<Self, TransmitError> {
        let resolve_error = |reason: String| TransmitError::Resolve {
            target: format!("{}:{}", host, port),
            reason,
        };
        let target = (host, port)
            .to_socket_addrs()
            .map_err(|e| resolve_error(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_error("no address found".to_string()))?;

        let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(local).map_err(TransmitError::Socket)?;
        // A zero timeout is rejected by the OS; treat it as blocking
        let timeout = (!send_timeout.is_zero()).then_some(send_timeout);
        socket
            .set_write_timeout(timeout)
            .map_err(TransmitError::Socket)?;

        debug!(
            "UDP socket bound to {:?}, target {}",
            socket.local_addr().ok(),
            target
        );
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DatagramSink for UdpSink {
    fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send_to(packet, self.target)
    }
}

/// Opens the sink for a transmitter
pub type SinkFactory =
    Arc<dyn Fn(&TransmitSettings) -> Result<Box<dyn DatagramSink>, TransmitError> + Send + Sync>;

pub fn udp_sink_factory() -> SinkFactory {
    Arc::new(
        |settings: &TransmitSettings| -> Result<Box<dyn DatagramSink>, TransmitError> {
            let sink = UdpSink::connect(&settings.host, settings.port, settings.send_timeout)?;
            Ok(Box::new(sink))
        },
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub attempts: u64,
    pub packets_sent: u64,
    pub send_failures: u64,
    pub errors_logged: u64,
    pub fallbacks: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    Skipped,
    Failed(FailureKind),
}

#[state]
#[derive(Debug, Clone)]
pub enum TransmitState {
    Idle,
    Streaming,
    Stopping,
}

#[machine]
pub struct Transmitter<S: TransmitState> {
    settings: TransmitSettings,
    input: SharedInputState,
    events: EventPublisher,
    sink: Option<Box<dyn DatagramSink>>,
    error_limiter: RateLimiter,
    fallback_limiter: RateLimiter,
    // Last reported network status
    link_up: bool,
    stats: TransmitStats,
}

impl<S: TransmitState> Transmitter<S> {
    pub fn settings(&self) -> &TransmitSettings {
        &self.settings
    }

    pub fn stats(&self) -> &TransmitStats {
        &self.stats
    }

    fn report_link(&mut self, up: bool) {
        self.link_up = up;
        let status = if up {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        };
        self.events.publish(PipelineEvent::Network(status));
    }
}

impl Transmitter<Idle> {
    pub fn create(settings: TransmitSettings, input: SharedInputState, events: EventPublisher) -> Self {
        debug!("Creating transmitter with settings: {:?}", settings);
        let error_limiter = RateLimiter::new(settings.error_log_interval);
        let fallback_limiter = RateLimiter::new(settings.error_log_interval);
        Self::new(
            settings,
            input,
            events,
            None,
            error_limiter,
            fallback_limiter,
            false,
            TransmitStats::default(),
        )
    }

    /// Creates the socket. On failure the error is logged here and the loop must not run.
    pub fn open(mut self, factory: &SinkFactory) -> Result<Transmitter<Streaming>, TransmitError> {
        match factory(&self.settings) {
            Ok(sink) => {
                info!(
                    "UDP socket ready, streaming to {} at {} Hz",
                    self.settings.target(),
                    self.settings.transmit_hz
                );
                self.sink = Some(sink);
                self.report_link(true);
                Ok(self.transition())
            }
            Err(e) => {
                error!("{}", e);
                self.report_link(false);
                Err(e)
            }
        }
    }
}

impl Transmitter<Streaming> {
    /// One tick: snapshot, encode, send
    pub fn transmit_once(&mut self) -> TickOutcome {
        let encoded = match self.input.wire_snapshot() {
            Ok(snapshot) => codec::encode(&snapshot),
            Err(e) => Encoded::neutral(CodecError::Unreadable(e.to_string())),
        };

        let packet = match encoded {
            Encoded::Exact(packet) => packet,
            Encoded::Fallback { packet, reason } => {
                self.stats.fallbacks += 1;
                if !self.settings.neutral_fallback {
                    self.stats.skipped += 1;
                    if self.fallback_limiter.should_process() {
                        warn!("Skipping tick, state not encodable: {}", reason);
                    }
                    return TickOutcome::Skipped;
                }
                if self.fallback_limiter.should_process() {
                    warn!("Sending neutral packet, state not encodable: {}", reason);
                }
                packet
            }
        };

        self.send(&packet)
    }

    /// Sends one datagram and updates link status and counters
    pub fn send(&mut self, packet: &[u8]) -> TickOutcome {
        if packet.len() != PACKET_SIZE {
            error!(
                "Invalid packet size: {} (expected {})",
                packet.len(),
                PACKET_SIZE
            );
        }

        self.stats.attempts += 1;
        let attempt = self.stats.attempts;
        if attempt <= DETAILED_PACKET_LOGS || attempt % PACKET_LOG_EVERY == 0 {
            debug!(
                "Packet #{}: {} | {}",
                attempt,
                codec::hex_dump(packet),
                codec::describe(packet)
            );
        }

        let result = match self.sink.as_mut() {
            Some(sink) => sink.send(packet).map_err(TransmitError::from_send),
            None => Err(TransmitError::Send(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket closed",
            ))),
        };

        match result {
            Ok(_) => {
                self.stats.packets_sent += 1;
                if !self.link_up {
                    info!("UDP link recovered, streaming to {}", self.settings.target());
                    self.report_link(true);
                } else if self.stats.packets_sent % self.settings.heartbeat_packets.max(1) == 0 {
                    debug!("Heartbeat: {} packets sent", self.stats.packets_sent);
                    self.report_link(true);
                }
                TickOutcome::Sent
            }
            Err(e) => {
                self.stats.send_failures += 1;
                if self.error_limiter.should_process() {
                    self.stats.errors_logged += 1;
                    match self.error_limiter.take_suppressed() {
                        0 => error!("{}", e),
                        suppressed => error!("{} ({} similar errors suppressed)", e, suppressed),
                    }
                }
                if self.link_up {
                    self.report_link(false);
                }
                TickOutcome::Failed(e.kind())
            }
        }
    }

    /// Transmits on the configured cadence until `cancel` fires
    pub fn run_until_cancelled(mut self, cancel: &CancellationToken) -> Transmitter<Stopping> {
        let mut cadence = Cadence::from_hz(self.settings.transmit_hz);
        while !cancel.is_cancelled() {
            self.transmit_once();
            cadence.wait();
        }
        self.transition()
    }
}

impl Transmitter<Stopping> {
    /// Closes the socket and reports the final status
    pub fn close(mut self) -> TransmitStats {
        self.sink = None;
        self.report_link(false);
        info!(
            "UDP socket closed after {} packets ({} send failures)",
            self.stats.packets_sent, self.stats.send_failures
        );
        self.stats
    }
}

/// Starts the transmitter on its own thread. Returns `None` from the thread when the
/// socket could not be created.
pub fn spawn_transmitter(
    factory: SinkFactory,
    settings: TransmitSettings,
    input: SharedInputState,
    events: EventPublisher,
    cancel: CancellationToken,
) -> io::Result<WorkerHandle<Option<TransmitStats>>> {
    WorkerHandle::spawn("network-transmitter", cancel, move |cancel| {
        Transmitter::create(settings, input, events)
            .open(&factory)
            .ok()
            .map(|streaming| streaming.run_until_cancelled(&cancel).close())
    })
}
