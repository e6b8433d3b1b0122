//! Status events pushed to the control panel
//!
//! Loops never call into the presentation layer. They push [`StatusEvent`]s into a
//! bounded tokio channel with `try_send`; when the consumer lags, events are dropped
//! instead of stalling a loop.

use crate::controller::state::DisplaySnapshot;
use crate::logging::{Severity, Sink};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum PipelineEvent {
    /// Controller presence changed
    Device(LinkStatus),
    /// Transmit socket opened, failed, recovered or closed (advisory for UDP)
    Network(LinkStatus),
    /// Latest logical state, published every poll cycle while connected
    Input(DisplaySnapshot),
    /// Orchestrator started or stopped the loops
    Pipeline(RunState),
    /// Log record forwarded through [`crate::logging::SinkLayer`]
    Log { severity: Severity, message: String },
}

/// Serializable for panels that render events as JSON or TOML
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub at: DateTime<Local>,
    pub event: PipelineEvent,
}

pub type EventReceiver = mpsc::Receiver<StatusEvent>;

/// Last published device and network status, kept even when the channel drops events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Links {
    pub device: LinkStatus,
    pub network: LinkStatus,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            device: LinkStatus::Disconnected,
            network: LinkStatus::Disconnected,
        }
    }
}

/// Creates the bounded status channel
pub fn channel(capacity: usize) -> (EventPublisher, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let links = Arc::new(Mutex::new(Links::default()));
    (EventPublisher { tx, links }, rx)
}

/// Non-blocking producer side of the status channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<StatusEvent>,
    links: Arc<Mutex<Links>>,
}

impl EventPublisher {
    pub fn links(&self) -> Links {
        *self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Device(link) => self.remember(|links| links.device = link),
            PipelineEvent::Network(link) => self.remember(|links| links.network = link),
            _ => {}
        }

        let status = StatusEvent {
            at: Local::now(),
            event,
        };
        match self.tx.try_send(status) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                trace!("Status channel full, dropping {:?}", dropped.event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Status channel closed");
            }
        }
    }
}

impl EventPublisher {
    fn remember(&self, f: impl FnOnce(&mut Links)) {
        f(&mut self.links.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Sink for EventPublisher {
    fn record(&self, severity: Severity, message: &str) {
        self.publish(PipelineEvent::Log {
            severity,
            message: message.to_string(),
        });
    }
}
