use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-link traffic counters, shared between worker threads.
#[derive(Debug, Default)]
pub struct LinkMetrics {
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    last_receive_ms: AtomicU64,
    last_transmit_ms: AtomicU64,
}

/// Point-in-time copy of [`LinkMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    /// Unix milliseconds, `None` before the first frame.
    pub last_receive_ms: Option<u64>,
    pub last_transmit_ms: Option<u64>,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_receive(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_receive_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_send(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.last_transmit_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stamp = |v: u64| (v != 0).then_some(v);
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_receive_ms: stamp(self.last_receive_ms.load(Ordering::Relaxed)),
            last_transmit_ms: stamp(self.last_transmit_ms.load(Ordering::Relaxed)),
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
