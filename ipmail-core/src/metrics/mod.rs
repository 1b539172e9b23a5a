//! Metrics for dispatch, publishing and persistence
//!
//! Emitted through the `metrics` facade; the library installs no recorder,
//! so the embedding application decides where they go.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

mod collector;

pub use collector::{DispatchStats, DispatchStatsSnapshot};

pub const DISPATCH_RECEIVED: &str = "ipmail.dispatch.received";
pub const DISPATCH_ROUTED: &str = "ipmail.dispatch.routed";
pub const DISPATCH_DISCARDED: &str = "ipmail.dispatch.discarded";
pub const PUBLISH_SENT: &str = "ipmail.publish.sent";
pub const STORE_SAVE_FAILED: &str = "ipmail.store.save_failed";
pub const DECODE_DURATION_MS: &str = "ipmail.decode.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(DISPATCH_RECEIVED, "Announcements taken off the subscription");
    describe_counter!(DISPATCH_ROUTED, "Messages decoded and routed to a mailbox");
    describe_counter!(DISPATCH_DISCARDED, "Announcements discarded, labelled by reason");
    describe_counter!(PUBLISH_SENT, "Messages stored and announced");
    describe_counter!(STORE_SAVE_FAILED, "Mailbox saves that failed after routing");
    describe_histogram!(DECODE_DURATION_MS, "Envelope decode duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a counter metric with one label
pub fn record_labeled_counter(name: &'static str, label: &'static str, value: &'static str) {
    counter!(name, label => value).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) -> f64 {
        let millis = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.name).record(millis);
        millis
    }
}
