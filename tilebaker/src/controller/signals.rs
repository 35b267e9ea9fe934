//! Cooperative control signals shared between a caller and its workers.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::JobError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SignalState {
    paused: bool,
    stopped: bool,
    running: bool,
    connection_lost: bool,
}

/// Resume gate, stop flag, running indicator and connection-lost flag.
///
/// Every state change notifies the condition variable, so workers blocked in
/// [`wait_while_paused`](Self::wait_while_paused) or
/// [`sleep`](Self::sleep) wake immediately on resume or stop. The control
/// methods never block beyond taking the mutex.
#[derive(Debug)]
pub struct ControlSignals {
    state: Mutex<SignalState>,
    changed: Condvar,
    poll_interval: Duration,
}

impl Default for ControlSignals {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl ControlSignals {
    /// Creates idle signals; backoff sleeps re-check the state at least every
    /// `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            changed: Condvar::new(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SignalState)) {
        let mut state = self.state.lock();
        f(&mut state);
        self.changed.notify_all();
    }

    pub fn pause(&self) {
        self.update(|s| {
            if !s.stopped {
                s.paused = true;
            }
        });
    }

    pub fn resume(&self) {
        self.update(|s| s.paused = false);
    }

    /// Requests cancellation; also releases a paused worker.
    pub fn stop(&self) {
        self.update(|s| {
            s.stopped = true;
            s.paused = false;
        });
    }

    /// Returns to the idle state.
    pub fn reset(&self) {
        self.update(|s| *s = SignalState::default());
    }

    /// Ends a run: clears the running, paused and connection-lost flags.
    ///
    /// A pending stop request stays set so that workers sharing the run's
    /// signals still observe it; the next [`try_begin_run`](Self::try_begin_run)
    /// clears it.
    pub fn finish_run(&self) {
        self.update(|s| {
            s.running = false;
            s.paused = false;
            s.connection_lost = false;
        });
    }

    /// Marks the signals as running, starting from a fresh state.
    ///
    /// Returns false, leaving the state unchanged, when already running.
    pub fn try_begin_run(&self) -> bool {
        let mut state = self.state.lock();
        if state.running {
            return false;
        }
        *state = SignalState {
            running: true,
            ..SignalState::default()
        };
        self.changed.notify_all();
        true
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Blocks while paused.
    ///
    /// # Errors
    ///
    /// [`JobError::Cancelled`] once stop has been requested.
    pub fn wait_while_paused(&self) -> Result<(), JobError> {
        let mut state = self.state.lock();
        while state.paused && !state.stopped {
            self.changed.wait(&mut state);
        }
        if state.stopped {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    /// Sleeps for `duration` unless stopped first.
    ///
    /// # Errors
    ///
    /// [`JobError::Cancelled`] when stop is requested before or during the
    /// sleep.
    pub fn sleep(&self, duration: Duration) -> Result<(), JobError> {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return Err(JobError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let slice = (deadline - now).min(self.poll_interval);
            self.changed.wait_for(&mut state, slice);
        }
    }

    /// Sets the connection-lost flag. Returns true when it was not already
    /// set, i.e. for the first failure of a streak.
    pub fn mark_connection_lost(&self) -> bool {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.connection_lost, true)
    }

    pub fn clear_connection_lost(&self) {
        self.state.lock().connection_lost = false;
    }
}
