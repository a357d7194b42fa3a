//! Counters and gauges emitted through the `metrics` facade.

use crate::scheduler::QueueKind;

/// A request was admitted. `route` names where it was placed.
pub fn record_admission(route: &'static str) {
    ::metrics::counter!("relay_requests_admitted_total", "route" => route).increment(1);
}

/// A request was held back behind an in-flight duplicate.
pub fn record_staged() {
    ::metrics::counter!("relay_requests_staged_total").increment(1);
}

/// Staged duplicates were released to the cache queue.
pub fn record_released(count: usize) {
    ::metrics::counter!("relay_requests_released_total").increment(count as u64);
}

pub fn record_finished() {
    ::metrics::counter!("relay_requests_finished_total").increment(1);
}

pub fn record_cancelled(count: usize) {
    ::metrics::counter!("relay_requests_cancelled_total").increment(count as u64);
}

/// One dispatcher iteration completed with the given outcome label.
pub fn record_dispatch(kind: QueueKind, outcome: &'static str) {
    ::metrics::counter!(
        "relay_dispatch_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_in_flight(count: usize) {
    ::metrics::gauge!("relay_in_flight").set(count as f64);
}
