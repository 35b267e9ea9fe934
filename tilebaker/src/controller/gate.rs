//! Fetch gate honouring the controller's signals.

use tracing::{debug, warn};

use super::callbacks::JobCallbacks;
use super::signals::ControlSignals;
use crate::coord::TileCoord;
use crate::error::JobError;
use crate::job::{FetchAttempt, FetchGate, FetchPurpose};
use crate::retry::{retry, Backoff, Verdict};
use crate::source::SourceError;

/// Gate used by controller workers.
///
/// Each attempt first passes the resume gate and fails with
/// [`JobError::Cancelled`] once stop is requested. Connectivity failures of
/// gathers are retried without limit when connection waiting is enabled,
/// sleeping per the backoff schedule in stop-aware slices. Failures carrying
/// an HTTP status, and every failure of a size sample, propagate at once.
pub(crate) struct ControlledGate<'a> {
    signals: &'a ControlSignals,
    callbacks: &'a JobCallbacks,
    backoff: &'a Backoff,
    wait_connection: bool,
}

impl<'a> ControlledGate<'a> {
    pub(crate) fn new(
        signals: &'a ControlSignals,
        callbacks: &'a JobCallbacks,
        backoff: &'a Backoff,
        wait_connection: bool,
    ) -> Self {
        Self {
            signals,
            callbacks,
            backoff,
            wait_connection,
        }
    }

    fn classify(&self, purpose: FetchPurpose, error: &JobError) -> Verdict {
        let connectivity = error.source_error().is_some_and(SourceError::is_connectivity);
        if connectivity && self.wait_connection && purpose == FetchPurpose::Gather {
            Verdict::Retry
        } else {
            Verdict::Fail
        }
    }
}

impl FetchGate for ControlledGate<'_> {
    fn fetch(
        &self,
        purpose: FetchPurpose,
        tile: &TileCoord,
        attempt: &mut FetchAttempt<'_>,
    ) -> Result<Vec<u8>, JobError> {
        retry(
            self.backoff,
            None,
            || {
                self.signals.wait_while_paused()?;
                match attempt() {
                    Ok(data) => {
                        self.signals.clear_connection_lost();
                        Ok(data)
                    }
                    Err(e) => {
                        if matches!(e, SourceError::Download { .. })
                            && self.signals.mark_connection_lost()
                        {
                            warn!(tile = %tile, error = %e, "Connection lost");
                            self.callbacks.connection_lost();
                        }
                        Err(JobError::from(e))
                    }
                }
            },
            |e| self.classify(purpose, e),
            |delay| {
                debug!(tile = %tile, delay_ms = delay.as_millis() as u64, "Waiting for connection");
                self.signals.sleep(delay)
            },
        )
    }

    fn gathered(&self, fetched: u64, total: u64) {
        self.callbacks.progress(fetched, total);
    }
}
