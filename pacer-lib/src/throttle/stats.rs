use std::time::Duration;

use serde::Serialize;

/// Record and report statistics for a [`crate::Throttle`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThrottleStats {
    /// Number of requests queued on this throttle
    pub submitted: u64,
    /// Number of requests handed to the transport
    pub dispatched: u64,
    /// Number of requests for which the transport returned a response
    pub succeeded: u64,
    /// Number of requests for which the transport failed
    pub failed: u64,
    /// Number of times a dispatch loop was started
    pub runs: u64,
    /// Number of sweeps over the slot pool
    pub sweeps: u64,
    /// Highest number of requests in flight at the same time
    pub peak_in_flight: usize,
    /// Highest number of requests waiting in the queue at the same time
    pub peak_queued: usize,
    /// Accumulated time requests spent in the queue
    #[serde(with = "humantime_serde")]
    pub total_queue_time: Duration,
}

impl ThrottleStats {
    pub(crate) fn record_submission(&mut self, queued: usize) {
        self.submitted += 1;
        self.peak_queued = self.peak_queued.max(queued);
    }

    pub(crate) fn record_dispatch(&mut self, queue_time: Duration, in_flight: usize) {
        self.dispatched += 1;
        self.total_queue_time += queue_time;
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }

    pub(crate) const fn record_outcome(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Number of dispatched requests that have not settled yet
    #[must_use]
    pub const fn unsettled(&self) -> u64 {
        self.dispatched.saturating_sub(self.succeeded + self.failed)
    }

    /// Average time a request waited for a slot
    #[must_use]
    pub fn average_queue_time(&self) -> Option<Duration> {
        if self.dispatched == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        Some(self.total_queue_time / self.dispatched as u32)
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        let avg_wait = self
            .average_queue_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));

        format!(
            "{} requests ({} ok, {} failed), {} sweeps, peak {} in flight, avg wait: {}",
            self.dispatched, self.succeeded, self.failed, self.sweeps, self.peak_in_flight, avg_wait
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lifecycle() {
        let mut stats = ThrottleStats::default();
        stats.record_submission(1);
        stats.record_submission(2);
        stats.record_dispatch(Duration::from_millis(100), 1);
        stats.record_dispatch(Duration::from_millis(300), 2);
        stats.record_outcome(true);

        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.peak_queued, 2);
        assert_eq!(stats.peak_in_flight, 2);
        assert_eq!(stats.unsettled(), 1);
        assert_eq!(stats.average_queue_time(), Some(Duration::from_millis(200)));

        stats.record_outcome(false);
        assert_eq!(stats.unsettled(), 0);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_summary() {
        let mut stats = ThrottleStats::default();
        assert_eq!(
            stats.summary(),
            "0 requests (0 ok, 0 failed), 0 sweeps, peak 0 in flight, avg wait: N/A"
        );

        stats.sweeps = 1;
        stats.record_dispatch(Duration::from_millis(120), 1);
        stats.record_outcome(true);
        assert_eq!(
            stats.summary(),
            "1 requests (1 ok, 0 failed), 1 sweeps, peak 1 in flight, avg wait: 120ms"
        );
    }
}
