//! Shutdown coordination
//!
//! Signal delivery, sink failure and startup rollback all end up in
//! [`ShutdownCoordinator::shutdown`]. It restores concealed devices first, then
//! cancels every loop and waits for each to finish. Every step is attempted
//! regardless of how the previous ones went, and calling it again returns the
//! first report without touching anything.
//!
//! Signal handlers are installed before any device is concealed, so a signal
//! that lands mid-startup is routed here instead of killing the process with
//! nodes still hidden. Records registered after a shutdown are restored on
//! the spot.

use crate::controller::acquisition::RestoreOutcome;
use crate::controller::{ConcealedDeviceRecord, LoopError};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a shutdown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub restored: usize,
    pub already_visible: usize,
    pub restore_failures: usize,
    pub loops_stopped: usize,
    /// Loops that ended with an error or panicked.
    pub loop_failures: usize,
}

type LoopHandle = JoinHandle<Result<(), LoopError>>;

#[derive(Default)]
struct ShutdownState {
    records: Vec<ConcealedDeviceRecord>,
    tasks: Vec<(&'static str, LoopHandle)>,
    report: Option<ShutdownReport>,
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    state: Mutex<ShutdownState>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: Mutex::new(ShutdownState::default()),
        }
    }

    /// The token every loop watches.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn register_records(&self, records: impl IntoIterator<Item = ConcealedDeviceRecord>) {
        let mut state = self.state.lock().await;
        if state.report.is_none() {
            state.records.extend(records);
            return;
        }
        for record in records {
            warn!(
                "Shutdown already ran, restoring {} immediately",
                record.original.display()
            );
            if let Err(e) = record.restore() {
                error!("{}", e);
            }
        }
    }

    /// Loops tracked after shutdown are left detached; the token is already
    /// cancelled so they stop on their first poll.
    pub async fn track(&self, name: &'static str, handle: LoopHandle) {
        let mut state = self.state.lock().await;
        if state.report.is_some() {
            debug!("Loop '{}' started after shutdown", name);
            return;
        }
        debug!("Tracking loop '{}'", name);
        state.tasks.push((name, handle));
    }

    /// Runs [`shutdown`](Self::shutdown) once `trigger` resolves. The watcher
    /// exits without doing anything if the token is cancelled first.
    pub fn shutdown_on<F>(self: &Arc<Self>, trigger: F) -> JoinHandle<()>
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let token = coordinator.token();
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                reason = trigger => {
                    info!("Shutdown requested by {}", reason);
                    coordinator.shutdown().await;
                }
            }
        })
    }

    /// Restores devices, cancels loops and waits for them. Idempotent.
    ///
    /// Concurrent callers queue on the state lock; whoever gets it first does
    /// the work, the rest receive the same report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut state = self.state.lock().await;
        if let Some(report) = &state.report {
            debug!("Shutdown already complete");
            return report.clone();
        }
        info!("Shutting down");

        let mut report = ShutdownReport::default();

        for record in state.records.drain(..) {
            match record.restore() {
                Ok(RestoreOutcome::Restored) => report.restored += 1,
                Ok(RestoreOutcome::AlreadyVisible) => report.already_visible += 1,
                Err(e) => {
                    error!("{}", e);
                    report.restore_failures += 1;
                }
            }
        }

        self.token.cancel();

        for (name, handle) in state.tasks.drain(..) {
            match handle.await {
                Ok(Ok(())) => {
                    debug!("Loop '{}' stopped", name);
                    report.loops_stopped += 1;
                }
                Ok(Err(e)) => {
                    warn!("Loop '{}' ended with error: {}", name, e);
                    report.loop_failures += 1;
                }
                Err(e) => {
                    error!("Loop '{}' did not finish cleanly: {}", name, e);
                    report.loop_failures += 1;
                }
            }
        }

        info!(
            "Shutdown complete: {} restored, {} already visible, {} restore failures, {} loops stopped, {} loop failures",
            report.restored,
            report.already_visible,
            report.restore_failures,
            report.loops_stopped,
            report.loop_failures
        );
        state.report = Some(report.clone());
        report
    }
}

/// Hangup, terminate, interrupt and quit handlers.
pub struct TerminationSignals {
    hangup: Signal,
    terminate: Signal,
    interrupt: Signal,
    quit: Signal,
}

impl TerminationSignals {
    /// Replaces the default disposition of all four signals from here on.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Resolves with the name of the first signal delivered.
    pub async fn recv(&mut self) -> &'static str {
        let name = tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.quit.recv() => "SIGQUIT",
        };
        info!("Received {}", name);
        name
    }
}
