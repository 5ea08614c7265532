use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Global runtime metrics for all listeners in the process.
///
/// Purpose:
/// - Track connection churn (connects, reconnects, timeouts)
/// - Track session token lifecycle
/// - Track throughput and contained errors
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // High-level
    pub listeners_active: AtomicUsize,

    // WebSocket level
    pub ws_connections_active: AtomicUsize,
    pub ws_reconnects: AtomicUsize,
    pub pings_sent: AtomicUsize,
    pub pongs_received: AtomicUsize,
    pub pong_timeouts: AtomicUsize,

    // Session tokens
    pub tokens_acquired: AtomicUsize,
    pub tokens_renewed: AtomicUsize,
    pub tokens_revoked: AtomicUsize,
    pub renew_failures: AtomicUsize,

    // Throughput
    pub frames_received: AtomicUsize,
    pub events_forwarded: AtomicUsize,

    pub parse_errors: AtomicUsize,
    pub sink_errors: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary for the periodic reporter.
    pub fn summary(&self) -> String {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        format!(
            "listeners={} ws={} reconnects={} frames={} events={} parse_err={} sink_err={} tokens(acq={} renew={} revoke={} renew_fail={}) ping={} pong={} pong_timeout={}",
            get(&self.listeners_active),
            get(&self.ws_connections_active),
            get(&self.ws_reconnects),
            get(&self.frames_received),
            get(&self.events_forwarded),
            get(&self.parse_errors),
            get(&self.sink_errors),
            get(&self.tokens_acquired),
            get(&self.tokens_renewed),
            get(&self.tokens_revoked),
            get(&self.renew_failures),
            get(&self.pings_sent),
            get(&self.pongs_received),
            get(&self.pong_timeouts),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));

/// Shorthand for `METRICS.<counter>.fetch_add(1, Relaxed)`.
pub fn incr(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reflects_counters() {
        let m = RuntimeMetrics::default();
        incr(&m.ws_reconnects);
        incr(&m.ws_reconnects);
        incr(&m.parse_errors);

        let s = m.summary();
        assert!(s.contains("reconnects=2"));
        assert!(s.contains("parse_err=1"));
        assert!(s.contains("listeners=0"));
    }
}
