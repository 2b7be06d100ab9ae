//! Health verdicts from request counter deltas

use std::sync::Mutex;

use crate::metrics::HealthSnapshot;
use crate::types::HealthStatus;

/// Default minimum number of requests in a window before failures count
pub const DEFAULT_MINIMUM_REQUEST_THRESHOLD: u32 = 1;

/// Default failure ratio at which the proxy turns unhealthy
pub const DEFAULT_REQUEST_FAILURE_THRESHOLD: f32 = 0.5;

/// Tracks counters between consecutive health checks
#[derive(Debug)]
pub struct HealthTracker {
    minimum_request_threshold: u32,
    request_failure_threshold: f32,
    baseline: Mutex<HealthSnapshot>,
}

impl HealthTracker {
    /// Zero thresholds fall back to their defaults
    pub fn new(minimum_request_threshold: u32, request_failure_threshold: f32) -> Self {
        Self {
            minimum_request_threshold: if minimum_request_threshold == 0 {
                DEFAULT_MINIMUM_REQUEST_THRESHOLD
            } else {
                minimum_request_threshold
            },
            request_failure_threshold: if request_failure_threshold <= 0.0 {
                DEFAULT_REQUEST_FAILURE_THRESHOLD
            } else {
                request_failure_threshold
            },
            baseline: Mutex::new(HealthSnapshot::default()),
        }
    }

    /// Judge the window since the previous call and start a new one
    pub fn evaluate(&self, current: HealthSnapshot) -> HealthStatus {
        let delta = {
            let mut baseline = self.baseline.lock().unwrap_or_else(|e| e.into_inner());
            let delta = current.delta(&baseline);
            *baseline = current;
            delta
        };

        let failures = delta.failures();
        if delta.requests >= u64::from(self.minimum_request_threshold)
            && failures as f64 / delta.requests as f64 >= f64::from(self.request_failure_threshold)
        {
            return HealthStatus::unhealthy(format!(
                "{} of {} requests failed ({} send failures, {} timeouts, {} unparseable)",
                failures, delta.requests, delta.send_failures, delta.timeouts, delta.unparseable
            ));
        }

        HealthStatus::healthy(format!("{} requests, {} failures", delta.requests, failures))
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_REQUEST_THRESHOLD, DEFAULT_REQUEST_FAILURE_THRESHOLD)
    }
}
