//! Port binding: the typed and raw handles a node uses to receive and send.

pub mod codec;
pub mod input;
pub mod output;

pub use input::{Input, InputRaw, Inputs};
pub use output::{Destination, Output, OutputRaw, Outputs, SendReport};

use crate::core::{HybridClock, NodeId};
use crate::observability::{default_sink, NodeMetrics, SharedEventSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What every port of a node shares: its identity, clock and reporting.
#[derive(Clone)]
pub(crate) struct PortEnv {
    pub node_id: NodeId,
    pub clock: Arc<HybridClock>,
    pub metrics: Arc<NodeMetrics>,
    pub events: SharedEventSink,
    pub polling: PollingInputs,
}

impl PortEnv {
    pub fn new(node_id: NodeId, clock: Arc<HybridClock>) -> Self {
        Self {
            metrics: Arc::new(NodeMetrics::new(node_id.as_ref())),
            node_id,
            clock,
            events: default_sink(),
            polling: PollingInputs::default(),
        }
    }
}

/// Count of a node's input handles still read through `recv`.
#[derive(Clone, Default, Debug)]
pub(crate) struct PollingInputs(Arc<AtomicUsize>);

impl PollingInputs {
    pub fn acquire(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}
