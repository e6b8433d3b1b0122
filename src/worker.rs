//! Named loop threads with cooperative, bounded shutdown

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Handle to a loop running on its own OS thread
#[derive(Debug)]
pub struct WorkerHandle<T> {
    name: String,
    cancel: CancellationToken,
    join: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Spawns `body` on a named thread; `body` must return once `cancel` fires
    pub fn spawn<F>(name: &str, cancel: CancellationToken, body: F) -> io::Result<Self>
    where
        F: FnOnce(CancellationToken) -> T + Send + 'static,
    {
        let token = cancel.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        debug!("Spawned worker thread {}", name);
        Ok(Self {
            name: name.to_string(),
            cancel,
            join: Some(join),
        })
    }

    /// Requests shutdown and waits up to `timeout`.
    ///
    /// Returns the loop's result, or `None` if it panicked or is still running when
    /// the timeout expires. A loop that overruns is detached, not killed.
    pub fn stop(mut self, timeout: Duration) -> Option<T> {
        self.cancel.cancel();
        let join = self.join.take()?;

        let deadline = Instant::now() + timeout;
        while !join.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker {} did not stop within {:?}, detaching it",
                    self.name, timeout
                );
                return None;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        match join.join() {
            Ok(result) => {
                debug!("Worker {} stopped", self.name);
                Some(result)
            }
            Err(_) => {
                error!("Worker {} panicked", self.name);
                None
            }
        }
    }
}
