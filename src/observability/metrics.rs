use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters for one node instance.
pub struct NodeMetrics {
    node_id: String,
    iterations: AtomicU64,
    short_circuits: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    errors_count: AtomicU64,
    local_deadline_misses: AtomicU64,
    e2e_deadline_misses: AtomicU64,
    missed_production_windows: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl NodeMetrics {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            iterations: AtomicU64::new(0),
            short_circuits: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            local_deadline_misses: AtomicU64::new(0),
            e2e_deadline_misses: AtomicU64::new(0),
            missed_production_windows: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Iterations where the input rule declined to run.
    pub fn short_circuits(&self) -> u64 {
        self.short_circuits.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn local_deadline_misses(&self) -> u64 {
        self.local_deadline_misses.load(Ordering::Relaxed)
    }

    pub fn e2e_deadline_misses(&self) -> u64 {
        self.e2e_deadline_misses.load(Ordering::Relaxed)
    }

    pub fn missed_production_windows(&self) -> u64 {
        self.missed_production_windows.load(Ordering::Relaxed)
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_circuit(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A destination was unreachable. Also counts as an error.
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        self.record_error();
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_deadline_miss(&self) {
        self.local_deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_e2e_deadline_misses(&self, count: u64) {
        self.e2e_deadline_misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_missed_production_window(&self) {
        self.missed_production_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}
