//! Double-signal cancellation
//!
//! The first interrupt only arms the gate and asks the user to press again.
//! A second interrupt inside the window fires the task's cancellation token.
//! An armed gate whose window has passed is treated as a fresh first press.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Window in which a second interrupt confirms the cancel
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(1);

/// What an interrupt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSignal {
    /// First press; show "press again to cancel"
    Armed,
    /// Second press in time; the token has been cancelled
    Confirmed,
}

#[derive(Debug)]
pub struct CancelGate {
    token: CancellationToken,
    window: Duration,
    armed_at: Option<Instant>,
}

impl CancelGate {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            window: CONFIRM_WINDOW,
            armed_at: None,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Register an interrupt now
    pub fn signal(&mut self) -> CancelSignal {
        self.signal_at(Instant::now())
    }

    /// Register an interrupt observed at `now`
    pub fn signal_at(&mut self, now: Instant) -> CancelSignal {
        if self.token.is_cancelled() {
            return CancelSignal::Confirmed;
        }
        match self.armed_at {
            Some(armed) if now.saturating_duration_since(armed) <= self.window => {
                self.armed_at = None;
                self.token.cancel();
                CancelSignal::Confirmed
            }
            _ => {
                self.armed_at = Some(now);
                CancelSignal::Armed
            }
        }
    }
}

/// Feed Ctrl-C presses into a gate until its token fires.
///
/// `notify` is called with the result of each press.
pub fn watch_ctrl_c<F>(mut gate: CancelGate, notify: F) -> JoinHandle<()>
where
    F: Fn(CancelSignal) + Send + 'static,
{
    tokio::spawn(async move {
        let token = gate.token().clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                pressed = tokio::signal::ctrl_c() => {
                    if let Err(e) = pressed {
                        warn!(error = %e, "Cannot listen for Ctrl-C");
                        break;
                    }
                    let signal = gate.signal();
                    debug!(?signal, "Interrupt received");
                    if signal == CancelSignal::Confirmed {
                        info!("Cancellation confirmed");
                    }
                    notify(signal);
                }
            }
        }
    })
}
