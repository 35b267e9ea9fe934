//! Job lifecycle callbacks.

use std::fmt;

use crate::error::JobError;

pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&JobError) + Send + Sync>;
pub type NotifyCallback = Box<dyn Fn() + Send + Sync>;

/// Callbacks fired from worker threads.
///
/// Every callback is optional. They run on the worker that triggers them, so
/// they should return quickly.
///
/// ```
/// use tilebaker::controller::JobCallbacks;
///
/// let callbacks = JobCallbacks::new()
///     .on_progress(|fetched, total| println!("{}/{}", fetched, total))
///     .on_final(|| println!("done"));
/// ```
#[derive(Default)]
pub struct JobCallbacks {
    progress: Option<ProgressCallback>,
    success: Option<NotifyCallback>,
    error: Option<ErrorCallback>,
    connection_lost: Option<NotifyCallback>,
    final_: Option<NotifyCallback>,
}

impl JobCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after every gathered tile with `(fetched, total)`.
    pub fn on_progress(mut self, f: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Called when a run built its container or found it already present.
    pub fn on_success(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    /// Called when a run fails. Not called for cancellation.
    pub fn on_error(mut self, f: impl Fn(&JobError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Called on the first download failure of a streak.
    pub fn on_connection_lost(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connection_lost = Some(Box::new(f));
        self
    }

    /// Called exactly once at the end of every run.
    pub fn on_final(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.final_ = Some(Box::new(f));
        self
    }

    pub(crate) fn progress(&self, fetched: u64, total: u64) {
        if let Some(f) = &self.progress {
            f(fetched, total);
        }
    }

    pub(crate) fn success(&self) {
        if let Some(f) = &self.success {
            f();
        }
    }

    pub(crate) fn error(&self, error: &JobError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    pub(crate) fn connection_lost(&self) {
        if let Some(f) = &self.connection_lost {
            f();
        }
    }

    pub(crate) fn finished(&self) {
        if let Some(f) = &self.final_ {
            f();
        }
    }
}

impl fmt::Debug for JobCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCallbacks")
            .field("progress", &self.progress.is_some())
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("connection_lost", &self.connection_lost.is_some())
            .field("final", &self.final_.is_some())
            .finish()
    }
}
