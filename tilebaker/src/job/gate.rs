//! Per-tile fetch wrapper.
//!
//! [`BuildJob`](super::BuildJob) routes every tile fetch through a
//! [`FetchGate`]. The gate decides whether an attempt may start, how failures
//! are retried, and observes progress. [`DirectGate`] attempts once and never
//! blocks; the job controller supplies a gate that honours pause/resume/stop
//! and waits out connectivity loss.

use crate::coord::TileCoord;
use crate::error::JobError;
use crate::source::SourceError;

/// Why a tile is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Gathering the tile for packaging; counts toward progress.
    Gather,
    /// Probing the tile for a size estimate.
    Sample,
}

/// A single fetch attempt, repeatable by the gate.
pub type FetchAttempt<'a> = dyn FnMut() -> Result<Vec<u8>, SourceError> + 'a;

/// Wraps tile fetches with flow control.
pub trait FetchGate: Send + Sync {
    /// Runs `attempt` for `tile`, possibly several times.
    ///
    /// # Errors
    ///
    /// [`JobError::Cancelled`] when the fetch was stopped, or the source
    /// error that the gate decided not to retry.
    fn fetch(
        &self,
        purpose: FetchPurpose,
        tile: &TileCoord,
        attempt: &mut FetchAttempt<'_>,
    ) -> Result<Vec<u8>, JobError>;

    /// Called after a gathered tile has been counted.
    fn gathered(&self, _fetched: u64, _total: u64) {}
}

/// Gate that attempts each fetch exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectGate;

impl FetchGate for DirectGate {
    fn fetch(
        &self,
        _purpose: FetchPurpose,
        _tile: &TileCoord,
        attempt: &mut FetchAttempt<'_>,
    ) -> Result<Vec<u8>, JobError> {
        attempt().map_err(JobError::from)
    }
}
