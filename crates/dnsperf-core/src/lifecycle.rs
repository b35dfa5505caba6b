//! Run lifecycle control
//!
//! [`LifecycleController`] is the stop channel shared between the round
//! scheduler and whoever may ask it to stop (a signal handler, a test, an
//! embedding application). It is handed to the scheduler at construction;
//! there is no process-wide instance.
//!
//! ```text
//!  Idle ──start()──▶ Running ──stop()──▶ Stopping ──finish()──▶ Stopped
//!    │                                       ▲
//!    └─────────────────stop()────────────────┘
//! ```
//!
//! `stop()` only requests the transition; the scheduler observes it at the
//! next round boundary and finishes the round in flight first.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Lifecycle state of a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started yet
    Idle,
    /// Rounds are being executed
    Running,
    /// Stop requested; the current round is finishing
    Stopping,
    /// The run has returned
    Stopped,
}

/// Shared running/stopped state with an idempotent, thread-safe `stop()`
#[derive(Debug)]
pub struct LifecycleController {
    state: watch::Sender<RunState>,
}

impl LifecycleController {
    /// Create a controller in the `Idle` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self { state }
    }

    /// Transition `Idle → Running`
    ///
    /// The state check and the transition happen under one lock, so a stop
    /// racing with start is always observed.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The controller is now `Running`
    /// - `Ok(false)`: A stop was requested before start; state stays `Stopping`
    /// - `Err(Error)`: The controller was already `Running` or `Stopped`
    pub fn start(&self) -> Result<bool> {
        let mut previous = RunState::Idle;
        let started = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == RunState::Idle {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });

        match previous {
            _ if started => {
                info!("Monitor running");
                Ok(true)
            }
            RunState::Stopping => Ok(false),
            _ => Err(Error::invalid_input(format!(
                "cannot start a run that is {:?}",
                previous
            ))),
        }
    }

    /// Request a stop
    ///
    /// Idempotent; safe to call from any thread or task, before or during a
    /// run. Returns `true` if this call performed the transition.
    pub fn stop(&self) -> bool {
        let requested = self.state.send_if_modified(|state| match state {
            RunState::Idle | RunState::Running => {
                *state = RunState::Stopping;
                true
            }
            RunState::Stopping | RunState::Stopped => false,
        });

        if requested {
            info!("Stop requested, finishing current round");
        } else {
            debug!("Stop already requested");
        }
        requested
    }

    /// Mark the run as returned
    pub(crate) fn finish(&self) {
        self.state.send_replace(RunState::Stopped);
    }

    /// Whether rounds should keep running
    pub fn is_running(&self) -> bool {
        *self.state.borrow() == RunState::Running
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Wait until the controller leaves `Idle`/`Running`
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        loop {
            let done = matches!(*rx.borrow_and_update(), RunState::Stopping | RunState::Stopped);
            if done {
                return;
            }
            // The sender lives in `self`, so the channel cannot close here
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}
