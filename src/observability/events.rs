use crate::core::{E2EDeadlineMiss, LocalDeadlineMiss, NodeId, PortId, ToDescriptor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Noteworthy things happening inside a node loop.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Started {
        node: NodeId,
    },
    Finalized {
        node: NodeId,
    },
    SendFailed {
        node: NodeId,
        port: PortId,
        destination: ToDescriptor,
    },
    LocalDeadlineMissed {
        node: NodeId,
        miss: LocalDeadlineMiss,
    },
    E2EDeadlineMissed {
        node: NodeId,
        miss: E2EDeadlineMiss,
    },
    ProductionWindowMissed {
        node: NodeId,
        port: PortId,
        late_by: Duration,
    },
    IterationFailed {
        node: NodeId,
        error: String,
        recoverable: bool,
    },
}

/// Where node loops report their events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: NodeEvent);
}

/// Default sink: every event becomes a `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: NodeEvent) {
        match event {
            NodeEvent::Started { node } => tracing::debug!(node = %node, "node started"),
            NodeEvent::Finalized { node } => tracing::debug!(node = %node, "node finalized"),
            NodeEvent::SendFailed {
                node,
                port,
                destination,
            } => tracing::warn!(
                node = %node,
                port = %port,
                destination = %destination,
                "destination unreachable, message not delivered"
            ),
            NodeEvent::LocalDeadlineMissed { node, miss } => tracing::warn!(
                node = %node,
                deadline_ns = miss.deadline_ns,
                elapsed_ns = miss.elapsed_ns,
                "local deadline missed"
            ),
            NodeEvent::E2EDeadlineMissed { node, miss } => tracing::warn!(
                node = %node,
                from = %miss.from,
                to = %miss.to,
                elapsed_ns = miss.end.saturating_sub(miss.start),
                "end-to-end deadline missed"
            ),
            NodeEvent::ProductionWindowMissed {
                node,
                port,
                late_by,
            } => tracing::debug!(
                node = %node,
                port = %port,
                late_by_us = late_by.as_micros() as u64,
                "output callback missed its production window"
            ),
            NodeEvent::IterationFailed {
                node,
                error,
                recoverable,
            } => {
                if recoverable {
                    tracing::warn!(node = %node, error = %error, "iteration failed, continuing");
                } else {
                    tracing::error!(node = %node, error = %error, "iteration failed");
                }
            }
        }
    }
}

/// Sink keeping events in memory, handy to assert on in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<NodeEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: NodeEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Shared handle passed to ports and runners.
pub type SharedEventSink = Arc<dyn EventSink>;

pub fn default_sink() -> SharedEventSink {
    Arc::new(TracingEventSink)
}
