use super::ErrorPolicy;
use crate::core::{NodeId, NodeInstance};
use crate::error::NodeError;
use crate::observability::{NodeEvent, NodeMetrics, SharedEventSink};
use std::sync::Arc;

/// How one iteration ended, once its error has been classified.
#[derive(Debug)]
pub enum IterationOutcome {
    Continue,
    /// Upstream is gone or the node was cancelled: wind down normally.
    EndOfStream,
    Failed(anyhow::Error),
}

/// Wraps a node with metrics and the error policy of its flow.
pub struct ResilientNode {
    node_id: NodeId,
    inner: NodeInstance,
    metrics: Arc<NodeMetrics>,
    events: SharedEventSink,
    error_policy: ErrorPolicy,
}

impl ResilientNode {
    pub fn new(
        node_id: NodeId,
        inner: NodeInstance,
        metrics: Arc<NodeMetrics>,
        events: SharedEventSink,
        error_policy: ErrorPolicy,
    ) -> Self {
        Self {
            node_id,
            inner,
            metrics,
            events,
            error_policy,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub async fn iteration(&mut self) -> IterationOutcome {
        let start = self.metrics.start_processing();

        match self.inner.iteration().await {
            Ok(()) => {
                self.metrics.finish_processing(start);
                self.metrics.record_iteration();
                IterationOutcome::Continue
            }
            Err(e) => self.classify(e),
        }
    }

    fn classify(&self, error: anyhow::Error) -> IterationOutcome {
        let (end_of_stream, recoverable) = match error.downcast_ref::<NodeError>() {
            Some(e) => (e.is_end_of_stream(), e.is_recoverable()),
            None => (false, false),
        };

        if end_of_stream {
            return IterationOutcome::EndOfStream;
        }

        self.metrics.record_error();
        self.events.record(NodeEvent::IterationFailed {
            node: self.node_id.clone(),
            error: format!("{:#}", error),
            recoverable: recoverable && self.error_policy == ErrorPolicy::Skip,
        });

        match self.error_policy {
            ErrorPolicy::Skip if recoverable => IterationOutcome::Continue,
            _ => IterationOutcome::Failed(error),
        }
    }

    pub async fn finalize(&mut self) -> anyhow::Result<()> {
        self.inner.finalize().await
    }
}
