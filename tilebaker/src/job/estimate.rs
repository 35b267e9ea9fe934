//! Download time and size estimation helpers.

use std::time::Duration;

/// Upper bound for any download time estimate: 31 days.
pub const MAX_DOWNLOAD_TIME: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Added to the inter-request delay to seed the timing samples.
pub const INITIAL_SAMPLE_OVERHEAD: Duration = Duration::from_millis(150);

/// Default number of tiles probed per region by a size estimate.
pub const DEFAULT_MAX_SAMPLES: usize = 20;

/// Minimum number of tiles probed per region.
const MIN_SAMPLES: usize = 5;

/// One probe per this many tiles, between the minimum and the maximum.
const TILES_PER_SAMPLE: usize = 200;

/// Rolling list of per-tile download durations, in seconds.
///
/// Every real attempt appends its elapsed time; a failed attempt appends
/// [`MAX_DOWNLOAD_TIME`] as a penalty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingSamples {
    samples: Vec<f64>,
}

impl TimingSamples {
    /// Samples seeded with one expected duration.
    pub fn seeded(initial: Duration) -> Self {
        Self {
            samples: vec![initial.as_secs_f64()],
        }
    }

    pub fn push(&mut self, elapsed: Duration) {
        self.samples.push(elapsed.as_secs_f64());
    }

    pub fn push_failure(&mut self) {
        self.push(MAX_DOWNLOAD_TIME);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean duration; [`MAX_DOWNLOAD_TIME`] when there are no samples.
    pub fn mean_secs(&self) -> f64 {
        if self.samples.is_empty() {
            return MAX_DOWNLOAD_TIME.as_secs_f64();
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Expected time to download `remaining` tiles, capped at
    /// [`MAX_DOWNLOAD_TIME`].
    pub fn estimate(&self, remaining: u64) -> Duration {
        let secs = (self.mean_secs() * remaining as f64).min(MAX_DOWNLOAD_TIME.as_secs_f64());
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(MAX_DOWNLOAD_TIME)
    }
}

impl From<Vec<f64>> for TimingSamples {
    fn from(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}

/// Number of tiles probed for a region of `total` tiles.
///
/// `min(max_samples, max(5, total / 200))`, never more than `total`.
pub fn sample_count(total: usize, max_samples: usize) -> usize {
    max_samples
        .min(MIN_SAMPLES.max(total / TILES_PER_SAMPLE))
        .min(total)
}

/// Converts bytes to mebibytes.
pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / 1024.0 / 1024.0
}

/// Formats a duration as `1d 02h 03m 04s`, omitting leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_mean_times_remaining() {
        let samples = TimingSamples::from(vec![1.0, 3.0]);
        assert_eq!(samples.estimate(10), Duration::from_secs(20));
    }

    #[test]
    fn test_estimate_without_samples_is_max() {
        let samples = TimingSamples::default();
        assert_eq!(samples.estimate(1), MAX_DOWNLOAD_TIME);
        assert_eq!(samples.estimate(0), Duration::ZERO);
    }

    #[test]
    fn test_estimate_is_capped() {
        let mut samples = TimingSamples::seeded(Duration::from_secs(1));
        samples.push_failure();
        assert_eq!(samples.estimate(1_000), MAX_DOWNLOAD_TIME);
    }

    #[test]
    fn test_seeded_sample() {
        let samples = TimingSamples::seeded(Duration::from_millis(400));
        assert_eq!(samples.len(), 1);
        assert!((samples.mean_secs() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(0, 20), 0);
        assert_eq!(sample_count(3, 20), 3);
        assert_eq!(sample_count(100, 20), 5);
        assert_eq!(sample_count(2_000, 20), 10);
        assert_eq!(sample_count(100_000, 20), 20);
        assert_eq!(sample_count(100_000, 2), 2);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1h 02m 05s");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1d 01h 01m 01s");
    }
}
