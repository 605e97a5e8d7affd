use std::{
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::Instant,
};

use tracing::{debug, error, info};

use crate::{
    config::TempoConfig,
    error::{Error, Result},
    estimator::{TempoEstimator, Timestamp, TrackingState},
};

const THREAD_NAME: &str = "taptique-session";

/// Why the estimator went back to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Explicit [`SessionHandle::reset`].
    Manual,
    /// No tap arrived before the inactivity deadline.
    Inactivity,
    /// A tap arrived after a gap longer than the inactivity threshold.
    Gap,
}

/// State changes published to a session listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoEvent {
    Updated { bpm: Option<u32>, taps: usize },
    Reset { reason: ResetReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub bpm: Option<u32>,
    pub taps: usize,
    pub state: TrackingState,
}

impl Snapshot {
    fn of(estimator: &TempoEstimator) -> Self {
        Self {
            bpm: estimator.current_bpm(),
            taps: estimator.tap_count(),
            state: estimator.state(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Tap(Timestamp),
    Reset,
    Query(Sender<Snapshot>),
    Shutdown,
}

/// Cloneable sender side of a [`TapSession`], usable from any thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Sender<Command>,
}

impl SessionHandle {
    /// Tap at the current time.
    pub fn tap(&self) -> Result<()> {
        self.tap_at(Instant::now())
    }

    pub fn tap_at(&self, timestamp: Timestamp) -> Result<()> {
        self.send_command(Command::Tap(timestamp))
    }

    pub fn reset(&self) -> Result<()> {
        self.send_command(Command::Reset)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send_command(Command::Query(reply_tx))?;
        reply_rx.recv().map_err(|_| Error::SessionClosed)
    }

    pub fn current_bpm(&self) -> Result<Option<u32>> {
        Ok(self.snapshot()?.bpm)
    }

    fn send_command(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::SessionClosed)
    }
}

/// A tempo estimator owned by a dedicated worker thread.
///
/// Taps, resets, queries and the inactivity timeout are all handled on that
/// one thread, so a timeout can never interleave with a tap that is being
/// processed. Dropping the session stops the worker.
#[derive(Debug)]
pub struct TapSession {
    handle: SessionHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl TapSession {
    /// Start a session. State changes are sent to `listener` when one is given.
    pub fn spawn(config: TempoConfig, listener: Option<Sender<TempoEvent>>) -> Result<Self> {
        let estimator = TempoEstimator::new(config)?;
        let (tx, rx) = mpsc::channel::<Command>();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run_session(estimator, rx, listener))
            .map_err(|err| Error::Thread(err.to_string()))?;

        Ok(Self {
            handle: SessionHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn tap(&self) -> Result<()> {
        self.handle.tap()
    }

    pub fn tap_at(&self, timestamp: Timestamp) -> Result<()> {
        self.handle.tap_at(timestamp)
    }

    pub fn reset(&self) -> Result<()> {
        self.handle.reset()
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.handle.snapshot()
    }

    pub fn current_bpm(&self) -> Result<Option<u32>> {
        self.handle.current_bpm()
    }
}

impl Drop for TapSession {
    fn drop(&mut self) {
        if self.handle.send_command(Command::Shutdown).is_ok() {
            if let Some(handle) = self.thread.take() {
                if handle.join().is_err() {
                    error!("tap session thread panicked");
                }
            }
        }
    }
}

fn run_session(
    mut estimator: TempoEstimator,
    rx: mpsc::Receiver<Command>,
    listener: Option<Sender<TempoEvent>>,
) {
    let publish = |event: TempoEvent| {
        if let Some(listener) = &listener {
            // A listener that went away only loses notifications.
            let _ = listener.send(event);
        }
    };

    debug!("tap session started");

    loop {
        let command = match estimator.deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(timeout) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        if estimator.expire(Instant::now()) {
                            publish(TempoEvent::Reset {
                                reason: ResetReason::Inactivity,
                            });
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            Command::Tap(timestamp) => {
                let outcome = estimator.tap(timestamp);
                if outcome.restarted {
                    publish(TempoEvent::Reset {
                        reason: ResetReason::Gap,
                    });
                }
                publish(TempoEvent::Updated {
                    bpm: outcome.bpm,
                    taps: estimator.tap_count(),
                });
            }
            Command::Reset => {
                estimator.reset();
                info!("tempo reset");
                publish(TempoEvent::Reset {
                    reason: ResetReason::Manual,
                });
            }
            Command::Query(reply) => {
                let _ = reply.send(Snapshot::of(&estimator));
            }
            Command::Shutdown => break,
        }
    }

    debug!("tap session stopped");
}
