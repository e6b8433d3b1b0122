//! Tracing setup and the bridge to the control panel's log view
//!
//! Every loop logs through `tracing`. [`SinkLayer`] is a subscriber layer that hands a
//! copy of each record at or above a minimum level to a [`Sink`], so a log view can be
//! fed without the loops knowing it exists.

use serde::Serialize;
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::ERROR => Severity::Error,
            Level::WARN => Severity::Warning,
            Level::INFO => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Receiver of severity-tagged log text
pub trait Sink: Send + Sync {
    fn record(&self, severity: Severity, message: &str);
}

/// Forwards tracing events to a [`Sink`]
pub struct SinkLayer<K> {
    sink: K,
    min_level: Level,
}

impl<K: Sink> SinkLayer<K> {
    /// Forwards INFO and above
    pub fn new(sink: K) -> Self {
        Self::with_min_level(sink, Level::INFO)
    }

    pub fn with_min_level(sink: K, min_level: Level) -> Self {
        Self { sink, min_level }
    }
}

impl<S, K> Layer<S> for SinkLayer<K>
where
    S: Subscriber,
    K: Sink + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        // tracing orders levels by verbosity, ERROR being the smallest
        if level > self.min_level {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.sink
            .record(Severity::from_level(level), &visitor.finish());
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Installs the global subscriber: pretty console output filtered by `RUST_LOG`,
/// plus an optional [`SinkLayer`].
pub fn init_tracing<K: Sink + 'static>(sink: Option<K>) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .with(sink.map(SinkLayer::new))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, error, info, warn};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(Severity, String)>>>);

    impl Sink for Recorder {
        fn record(&self, severity: Severity, message: &str) {
            self.0
                .lock()
                .expect("recorder lock")
                .push((severity, message.to_string()));
        }
    }

    #[test]
    fn forwards_info_and_above_with_severity() {
        let recorder = Recorder::default();
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(recorder.clone()));

        tracing::subscriber::with_default(subscriber, || {
            debug!("too chatty");
            info!("Controller connected");
            warn!(port = 5500, "Send timed out");
            error!("UDP socket creation failed");
        });

        let records = recorder.0.lock().expect("recorder lock").clone();
        assert_eq!(
            records,
            vec![
                (Severity::Info, "Controller connected".to_string()),
                (Severity::Warning, "Send timed out port=5500".to_string()),
                (Severity::Error, "UDP socket creation failed".to_string()),
            ]
        );
    }

    #[test]
    fn min_level_can_include_debug() {
        let recorder = Recorder::default();
        let subscriber = tracing_subscriber::registry()
            .with(SinkLayer::with_min_level(recorder.clone(), Level::DEBUG));

        tracing::subscriber::with_default(subscriber, || {
            debug!("Packet #1");
            tracing::trace!("dropped");
        });

        let records = recorder.0.lock().expect("recorder lock").clone();
        assert_eq!(records, vec![(Severity::Debug, "Packet #1".to_string())]);
    }

    #[test]
    fn severity_labels() {
        assert_eq!(Severity::from_level(Level::WARN), Severity::Warning);
        assert_eq!(Severity::from_level(Level::TRACE), Severity::Debug);
        assert_eq!(Severity::Error.to_string(), "ERROR");
    }
}
