//! Pipeline lifecycle
//!
//! The [`Orchestrator`] owns the shared input state and starts or stops the poller
//! and transmitter threads as one unit. Start and stop are serialized by a mutex and
//! are idempotent, so a control panel can send them at any time.

use crate::config::BridgeConfig;
use crate::controller::backend::{gilrs_factory, BackendFactory};
use crate::controller::poller::{spawn_poller, PollerSettings};
use crate::controller::state::{DisplaySnapshot, SharedInputState, StateError};
use crate::events::{EventPublisher, LinkStatus, PipelineEvent, RunState};
use crate::network::transmitter::{
    spawn_transmitter, udp_sink_factory, SinkFactory, TransmitSettings, TransmitStats,
};
use crate::worker::WorkerHandle;
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Commands a control panel can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown command: {0} (expected start or stop)")]
pub struct UnknownCommand(pub String);

impl FromStr for ControlCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ControlCommand::Start),
            "stop" => Ok(ControlCommand::Stop),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// What a status view shows about the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    /// Last reported controller presence
    pub device: LinkStatus,
    /// Whether the transmit socket is open and the last send went through
    pub network: LinkStatus,
    pub target: String,
    pub poll_hz: u32,
    pub transmit_hz: u32,
}

struct Session {
    cancel: CancellationToken,
    poller: Option<WorkerHandle<()>>,
    transmitter: Option<WorkerHandle<Option<TransmitStats>>>,
}

pub struct Orchestrator {
    config: BridgeConfig,
    input: SharedInputState,
    events: EventPublisher,
    backend_factory: BackendFactory,
    sink_factory: SinkFactory,
    session: Mutex<Option<Session>>,
}

impl Orchestrator {
    /// Orchestrator for real hardware: gilrs input, UDP output
    pub fn new(config: BridgeConfig, events: EventPublisher) -> Self {
        Self::with_factories(config, events, gilrs_factory(), udp_sink_factory())
    }

    pub fn with_factories(
        config: BridgeConfig,
        events: EventPublisher,
        backend_factory: BackendFactory,
        sink_factory: SinkFactory,
    ) -> Self {
        Self {
            config,
            input: SharedInputState::new(),
            events,
            backend_factory,
            sink_factory,
            session: Mutex::new(None),
        }
    }

    pub fn handle(&self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Start => self.start(),
            ControlCommand::Stop => self.stop(),
        }
    }

    /// Starts both loops. Returns `false` if they were already running.
    pub fn start(&self) -> bool {
        let mut session = self.lock_session();
        if session.is_some() {
            debug!("Pipeline already running, ignoring start");
            return false;
        }

        info!(
            "Starting pipeline: polling at {} Hz, sending to {} at {} Hz",
            self.config.controller.poll_hz,
            self.config.network.target(),
            self.config.network.transmit_hz
        );
        let cancel = CancellationToken::new();

        let poller = spawn_poller(
            self.backend_factory.clone(),
            PollerSettings::from(&self.config.controller),
            self.input.clone(),
            self.events.clone(),
            cancel.clone(),
        )
        .map_err(|e| error!("Failed to spawn input poller: {}", e))
        .ok();

        let transmitter = spawn_transmitter(
            self.sink_factory.clone(),
            TransmitSettings::from(&self.config.network),
            self.input.clone(),
            self.events.clone(),
            cancel.clone(),
        )
        .map_err(|e| error!("Failed to spawn transmitter: {}", e))
        .ok();

        *session = Some(Session {
            cancel,
            poller,
            transmitter,
        });
        self.events.publish(PipelineEvent::Pipeline(RunState::Running));
        true
    }

    /// Stops both loops, waiting up to the configured timeout for each. Returns
    /// `false` if nothing was running.
    pub fn stop(&self) -> bool {
        let mut guard = self.lock_session();
        let Some(session) = guard.take() else {
            debug!("Pipeline not running, ignoring stop");
            return false;
        };

        info!("Stopping pipeline");
        session.cancel.cancel();
        let timeout = self.config.runtime.stop_timeout();

        if let Some(poller) = session.poller {
            poller.stop(timeout);
        }
        if let Some(transmitter) = session.transmitter {
            match transmitter.stop(timeout) {
                Some(Some(stats)) => info!(
                    "Transmitter stats: {} sent, {} failed, {} fallbacks",
                    stats.packets_sent, stats.send_failures, stats.fallbacks
                ),
                Some(None) => warn!("Transmitter never opened its socket"),
                None => {}
            }
        }

        self.events.publish(PipelineEvent::Pipeline(RunState::Stopped));
        info!("Pipeline stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock_session().is_some()
    }

    pub fn status(&self) -> PipelineStatus {
        let links = self.events.links();
        PipelineStatus {
            running: self.is_running(),
            device: links.device,
            network: links.network,
            target: self.config.network.target(),
            poll_hz: self.config.controller.poll_hz,
            transmit_hz: self.config.network.transmit_hz,
        }
    }

    pub fn input_snapshot(&self) -> Result<DisplaySnapshot, StateError> {
        self.input.display_snapshot()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // A panic while holding the lock leaves the session data intact.
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}
