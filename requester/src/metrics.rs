//! Request metrics for the requester service.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorKind, RequesterError};

/// Aggregated request metrics.
///
/// Thread-safe via atomics; shared via `Arc<Metrics>`.
#[derive(Default)]
pub struct Metrics {
    /// Requests accepted by the ledger.
    pub requests_submitted: AtomicU64,
    /// Requests whose result was consumed by the client state.
    pub requests_fulfilled: AtomicU64,
    /// Requests still unanswered when the polling budget ran out.
    pub requests_timed_out: AtomicU64,
    /// Requests refused before submission (permission, escrow, descriptor).
    pub requests_rejected: AtomicU64,
    /// Sum of submit-to-consume latencies in milliseconds.
    pub fulfillment_latency_sum_ms: AtomicU64,
    /// Last consumed VRF counter.
    pub last_counter: AtomicU64,
    /// Last consumed bounded result (truncated to 64 bits; results are below `max_result`).
    pub last_result: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self) {
        self.requests_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a consumed result with its latency.
    pub fn record_fulfillment(&self, counter: u64, value: u128, latency_ms: u64) {
        self.requests_fulfilled.fetch_add(1, Ordering::Relaxed);
        self.fulfillment_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.last_counter.store(counter, Ordering::Relaxed);
        self.last_result.store(value as u64, Ordering::Relaxed);
    }

    /// Classify a failed request; timeouts and refusals are counted apart.
    pub fn record_error(&self, error: &RequesterError) {
        match error.kind() {
            ErrorKind::Timeout => self.requests_timed_out.fetch_add(1, Ordering::Relaxed),
            _ => self.requests_rejected.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Average latency in milliseconds, or 0 if nothing was fulfilled.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.requests_fulfilled.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.fulfillment_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_submitted": self.requests_submitted.load(Ordering::Relaxed),
            "requests_fulfilled": self.requests_fulfilled.load(Ordering::Relaxed),
            "requests_timed_out": self.requests_timed_out.load(Ordering::Relaxed),
            "requests_rejected": self.requests_rejected.load(Ordering::Relaxed),
            "avg_fulfillment_latency_ms": self.avg_latency_ms(),
            "last_counter": self.last_counter.load(Ordering::Relaxed),
            "last_result": self.last_result.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_are_counted_apart_from_rejections() {
        let metrics = Metrics::new();
        metrics.record_error(&RequesterError::Timeout {
            expected_counter: 1,
            waited: Duration::from_secs(45),
        });
        metrics.record_error(&RequesterError::NoPendingRequest);
        let json = metrics.to_json();
        assert_eq!(json["requests_timed_out"], 1);
        assert_eq!(json["requests_rejected"], 1);
    }

    #[test]
    fn average_latency() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_latency_ms(), 0);
        metrics.record_fulfillment(1, 1260, 300);
        metrics.record_fulfillment(2, 7, 500);
        assert_eq!(metrics.avg_latency_ms(), 400);
        assert_eq!(metrics.to_json()["last_counter"], 2);
    }
}
