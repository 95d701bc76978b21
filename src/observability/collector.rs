use super::NodeMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub node_id: String,
    pub iterations: u64,
    pub short_circuits: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub errors_count: u64,
    pub local_deadline_misses: u64,
    pub e2e_deadline_misses: u64,
    pub missed_production_windows: u64,
    pub avg_latency_us: u64,
}

impl From<&NodeMetrics> for MetricsSnapshot {
    fn from(metrics: &NodeMetrics) -> Self {
        Self {
            node_id: metrics.node_id().to_string(),
            iterations: metrics.iterations(),
            short_circuits: metrics.short_circuits(),
            messages_received: metrics.messages_received(),
            messages_sent: metrics.messages_sent(),
            send_failures: metrics.send_failures(),
            errors_count: metrics.errors_count(),
            local_deadline_misses: metrics.local_deadline_misses(),
            e2e_deadline_misses: metrics.e2e_deadline_misses(),
            missed_production_windows: metrics.missed_production_windows(),
            avg_latency_us: metrics.avg_latency_us(),
        }
    }
}

/// Registry of the metrics of every node in a flow. Ordered by node id.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<NodeMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_id: impl Into<String>, metrics: Arc<NodeMetrics>) {
        self.metrics.insert(node_id.into(), metrics);
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(id, metrics)| (id.clone(), MetricsSnapshot::from(metrics.as_ref())))
            .collect()
    }

    pub fn get_node_metrics(&self, node_id: &str) -> Option<Arc<NodeMetrics>> {
        self.metrics.get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
