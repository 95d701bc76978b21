pub mod collector;
pub mod events;
pub mod metrics;
pub mod monitor;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use events::{
    default_sink, EventSink, MemoryEventSink, NodeEvent, SharedEventSink, TracingEventSink,
};
pub use metrics::NodeMetrics;
pub use monitor::FlowMonitor;
