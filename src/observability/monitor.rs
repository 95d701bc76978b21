use super::MetricsCollector;

fn plural(count: u64, word: &str) -> String {
    format!("{} {}{}", count, word, if count == 1 { "" } else { "s" })
}

/// Human-readable view over the metrics of a running flow.
pub struct FlowMonitor {
    collector: MetricsCollector,
}

impl FlowMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No nodes registered".to_string();
        }

        let mut report = String::from("=== Flow Metrics ===\n");

        for (node_id, metrics) in snapshot.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Iterations: {} ({} short-circuited)\n  Messages: {} received, {} sent\n  Errors: {} ({})\n  Deadline misses: {} local, {} end-to-end\n  Missed production windows: {}\n  Avg Latency: {}μs\n",
                node_id,
                metrics.iterations,
                metrics.short_circuits,
                metrics.messages_received,
                metrics.messages_sent,
                plural(metrics.errors_count, "error"),
                plural(metrics.send_failures, "send failure"),
                metrics.local_deadline_misses,
                metrics.e2e_deadline_misses,
                metrics.missed_production_windows,
                metrics.avg_latency_us
            ));
        }

        report
    }

    /// Snapshot of every node as JSON, for embedding in other tooling.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.collector.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
