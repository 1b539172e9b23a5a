//! Per-dispatcher outcome counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one dispatcher, readable while it runs
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    sent: AtomicU64,
    inbox: AtomicU64,
    requests: AtomicU64,
    not_announcement: AtomicU64,
    fetch_failed: AtomicU64,
    not_for_us: AtomicU64,
    task_failed: AtomicU64,
    save_failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub inbox: u64,
    pub requests: u64,
    pub not_announcement: u64,
    pub fetch_failed: u64,
    pub not_for_us: u64,
    pub task_failed: u64,
    pub save_failed: u64,
}

impl DispatchStatsSnapshot {
    pub fn routed(&self) -> u64 {
        self.sent + self.inbox + self.requests
    }

    pub fn discarded(&self) -> u64 {
        self.not_announcement + self.fetch_failed + self.not_for_us + self.task_failed
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_inbox(&self) {
        self.inbox.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_not_announcement(&self) {
        self.not_announcement.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failed(&self) {
        self.fetch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_not_for_us(&self) {
        self.not_for_us.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_task_failed(&self) {
        self.task_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_save_failed(&self) {
        self.save_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            inbox: self.inbox.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            not_announcement: self.not_announcement.load(Ordering::Relaxed),
            fetch_failed: self.fetch_failed.load(Ordering::Relaxed),
            not_for_us: self.not_for_us.load(Ordering::Relaxed),
            task_failed: self.task_failed.load(Ordering::Relaxed),
            save_failed: self.save_failed.load(Ordering::Relaxed),
        }
    }
}
