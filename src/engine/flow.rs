use crate::channel;
use crate::core::{
    Configuration, Context, E2EDeadline, FromDescriptor, HybridClock, NodeId, NodeInstance,
    NodeKind, ToDescriptor,
};
use crate::engine::config::RuntimeConfig;
use crate::engine::runner::{NodeRunner, StopReason};
use crate::engine::state::FlowState;
use crate::error::NodeError;
use crate::io::{Inputs, Outputs};
use crate::observability::{default_sink, FlowMonitor, MetricsCollector, NodeMetrics, SharedEventSink};
use crate::registry::{NodeConstructor, NodeRegistry};
use anyhow::{anyhow, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Factory = Box<dyn FnOnce(&mut Context, Inputs, Outputs) -> Result<NodeInstance> + Send>;

struct NodeEntry {
    id: NodeId,
    kind: NodeKind,
    factory: Factory,
    local_deadline: Option<Duration>,
}

/// Programmatic description of a flow: nodes, links and deadlines.
pub struct FlowBuilder {
    name: String,
    config: RuntimeConfig,
    registry: NodeRegistry,
    events: SharedEventSink,
    nodes: Vec<NodeEntry>,
    connections: Vec<(FromDescriptor, ToDescriptor)>,
    deadlines: Vec<E2EDeadline>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>, config: RuntimeConfig) -> Self {
        Self {
            name: name.into(),
            config,
            registry: NodeRegistry::from_inventory(),
            events: default_sink(),
            nodes: Vec::new(),
            connections: Vec::new(),
            deadlines: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Add a node of a registered type.
    pub fn add_node(
        &mut self,
        id: &str,
        node_type: &str,
        config: Configuration,
    ) -> Result<&mut Self, NodeError> {
        let constructor = self.registry.get(node_type)?.constructor;
        self.add_constructed(id, constructor, config)
    }

    /// Add a node built by `constructor`, bypassing the registry.
    pub fn add_constructed(
        &mut self,
        id: &str,
        constructor: NodeConstructor,
        config: Configuration,
    ) -> Result<&mut Self, NodeError> {
        self.push(
            id,
            constructor.kind(),
            Box::new(move |ctx, inputs, outputs| {
                constructor.construct(ctx, &config, inputs, outputs)
            }),
        )
    }

    /// Add a node built by an arbitrary closure, e.g. one capturing test state.
    pub fn add_with(
        &mut self,
        id: &str,
        kind: NodeKind,
        factory: impl FnOnce(&mut Context, Inputs, Outputs) -> Result<NodeInstance> + Send + 'static,
    ) -> Result<&mut Self, NodeError> {
        self.push(id, kind, Box::new(factory))
    }

    fn push(&mut self, id: &str, kind: NodeKind, factory: Factory) -> Result<&mut Self, NodeError> {
        if self.entry(id).is_some() {
            return Err(NodeError::DuplicateNode(id.to_string()));
        }
        self.nodes.push(NodeEntry {
            id: id.into(),
            kind,
            factory,
            local_deadline: None,
        });
        Ok(self)
    }

    fn entry(&self, id: &str) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.id.as_ref() == id)
    }

    /// Link `from_node.output` to `to_node.input`.
    pub fn connect(
        &mut self,
        from_node: &str,
        output: &str,
        to_node: &str,
        input: &str,
    ) -> Result<&mut Self, NodeError> {
        let from = self
            .entry(from_node)
            .ok_or_else(|| NodeError::InvalidConnection(format!("unknown node {}", from_node)))?;
        if !from.kind.has_outputs() {
            return Err(NodeError::InvalidConnection(format!(
                "{} is a {} and has no outputs",
                from_node, from.kind
            )));
        }
        let to = self
            .entry(to_node)
            .ok_or_else(|| NodeError::InvalidConnection(format!("unknown node {}", to_node)))?;
        if !to.kind.has_inputs() {
            return Err(NodeError::InvalidConnection(format!(
                "{} is a {} and has no inputs",
                to_node, to.kind
            )));
        }

        let link = (
            FromDescriptor::new(from_node, output),
            ToDescriptor::new(to_node, input),
        );
        if self.connections.contains(&link) {
            return Err(NodeError::InvalidConnection(format!(
                "{} -> {} is already connected",
                link.0, link.1
            )));
        }
        self.connections.push(link);
        Ok(self)
    }

    pub fn add_e2e_deadline(&mut self, deadline: E2EDeadline) -> Result<&mut Self, NodeError> {
        for node in [&deadline.from.node, &deadline.to.node] {
            if self.entry(node).is_none() {
                return Err(NodeError::InvalidConnection(format!(
                    "deadline references unknown node {}",
                    node
                )));
            }
        }
        self.deadlines.push(deadline);
        Ok(self)
    }

    /// Bound the time the node's `run` phase may take.
    pub fn local_deadline(&mut self, node: &str, deadline: Duration) -> Result<&mut Self, NodeError> {
        let entry = self
            .nodes
            .iter_mut()
            .find(|n| n.id.as_ref() == node)
            .ok_or_else(|| NodeError::UnknownNode(node.to_string()))?;
        entry.local_deadline = Some(deadline);
        Ok(self)
    }

    pub fn build(self) -> Flow {
        Flow {
            name: self.name,
            config: self.config,
            events: self.events,
            pending: Some(Pending {
                nodes: self.nodes,
                connections: self.connections,
                deadlines: self.deadlines,
            }),
            handles: Vec::new(),
            cancel: CancellationToken::new(),
            collector: MetricsCollector::new(),
            state: FlowState::Idle,
        }
    }
}

struct Pending {
    nodes: Vec<NodeEntry>,
    connections: Vec<(FromDescriptor, ToDescriptor)>,
    deadlines: Vec<E2EDeadline>,
}

/// A set of wired nodes, one task each once started.
pub struct Flow {
    name: String,
    config: RuntimeConfig,
    events: SharedEventSink,
    pending: Option<Pending>,
    handles: Vec<(NodeId, JoinHandle<Result<StopReason>>)>,
    cancel: CancellationToken,
    collector: MetricsCollector,
    state: FlowState,
}

impl Flow {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Transition to a new state with validation
    fn transition_to(&mut self, new_state: FlowState) -> Result<(), NodeError> {
        if !self.state.can_transition_to(&new_state) {
            return Err(NodeError::InvalidTransition {
                from: self.state.name().to_string(),
                to: new_state.name().to_string(),
            });
        }
        self.state = new_state;
        Ok(())
    }

    /// Wire the links, build every node and spawn one runner per node.
    pub async fn start(&mut self) -> Result<()> {
        let pending = self.pending.take().ok_or_else(|| NodeError::InvalidTransition {
            from: self.state.name().to_string(),
            to: "Initializing".to_string(),
        })?;
        self.transition_to(FlowState::Initializing {
            nodes: pending.nodes.len(),
        })?;

        match self.instantiate(pending) {
            Ok(runners) => {
                let nodes = runners.len();
                for runner in runners {
                    let node_id = runner.node_id().clone();
                    self.handles.push((node_id, runner.spawn()));
                }
                self.transition_to(FlowState::Running {
                    start_time: Some(Instant::now()),
                    nodes,
                })?;
                tracing::info!(flow = %self.name, nodes, "flow running");
                Ok(())
            }
            Err((node, e)) => {
                self.transition_to(FlowState::Error {
                    error_msg: format!("{:#}", e),
                    node: node.map(|n| n.to_string()),
                })?;
                Err(e)
            }
        }
    }

    fn instantiate(
        &mut self,
        pending: Pending,
    ) -> std::result::Result<Vec<NodeRunner>, (Option<NodeId>, anyhow::Error)> {
        let clock = Arc::new(HybridClock::new(self.config.runtime_uuid));
        let instance_uuid = Uuid::new_v4();

        let mut inputs: HashMap<NodeId, Inputs> = HashMap::new();
        let mut outputs: HashMap<NodeId, Outputs> = HashMap::new();
        let mut metrics: HashMap<NodeId, Arc<NodeMetrics>> = HashMap::new();
        for entry in &pending.nodes {
            let node_metrics = Arc::new(NodeMetrics::new(entry.id.as_ref()));
            self.collector.register(entry.id.as_ref(), node_metrics.clone());
            inputs.insert(
                entry.id.clone(),
                Inputs::new(entry.id.clone(), clock.clone())
                    .with_metrics(node_metrics.clone())
                    .with_events(self.events.clone()),
            );
            outputs.insert(
                entry.id.clone(),
                Outputs::new(entry.id.clone(), clock.clone())
                    .with_metrics(node_metrics.clone())
                    .with_events(self.events.clone()),
            );
            metrics.insert(entry.id.clone(), node_metrics);
        }

        for (from, to) in pending.connections {
            let (tx, rx) = channel::new(self.config.channel_capacity);
            let missing = |node: &NodeId| (Some(node.clone()), anyhow!(NodeError::UnknownNode(node.to_string())));
            outputs
                .get_mut(&from.node)
                .ok_or_else(|| missing(&from.node))?
                .add(from.output.clone(), to.clone(), tx);
            inputs
                .get_mut(&to.node)
                .ok_or_else(|| missing(&to.node))?
                .add(to.input.clone(), rx);
        }

        for deadline in pending.deadlines {
            if let Some(node_outputs) = outputs.get_mut(&deadline.from.node) {
                node_outputs.add_e2e_deadline(deadline);
            }
        }

        let mut runners = Vec::with_capacity(pending.nodes.len());
        for entry in pending.nodes {
            let mut ctx = Context::new(
                self.config.runtime_name.as_str(),
                self.config.runtime_uuid,
                self.name.as_str(),
                instance_uuid,
                entry.id.clone(),
            )
            .with_local_deadline(entry.local_deadline);

            let node_inputs = inputs
                .remove(&entry.id)
                .unwrap_or_else(|| Inputs::new(entry.id.clone(), clock.clone()));
            let node_outputs = outputs
                .remove(&entry.id)
                .unwrap_or_else(|| Outputs::new(entry.id.clone(), clock.clone()));

            let node = (entry.factory)(&mut ctx, node_inputs, node_outputs).map_err(|e| {
                let context = format!("Failed to build node {}", entry.id);
                (Some(entry.id.clone()), e.context(context))
            })?;

            let node_metrics = metrics
                .remove(&entry.id)
                .unwrap_or_else(|| Arc::new(NodeMetrics::new(entry.id.as_ref())));
            runners.push(
                NodeRunner::new(ctx, node)
                    .with_metrics(node_metrics)
                    .with_events(self.events.clone())
                    .with_error_policy(self.config.error_policy)
                    .with_cancellation(self.cancel.child_token()),
            );
            tracing::debug!(flow = %self.name, node = %entry.id, "node built");
        }
        Ok(runners)
    }

    /// Wait for every node to stop. The first node error cancels the other
    /// nodes and puts the flow in `Error`.
    pub async fn wait(&mut self) -> Result<()> {
        let mut running: FuturesUnordered<_> = std::mem::take(&mut self.handles)
            .into_iter()
            .map(|(node_id, handle)| async move { (node_id, handle.await) })
            .collect();
        let mut first_error: Option<(NodeId, anyhow::Error)> = None;

        while let Some((node_id, joined)) = running.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => Err(anyhow!("Node task {} aborted: {}", node_id, join_error)),
            };
            if let Err(e) = outcome {
                tracing::error!(flow = %self.name, node = %node_id, error = %e, "node failed");
                if first_error.is_none() {
                    self.cancel.cancel();
                    first_error = Some((node_id, e));
                }
            }
        }

        let FlowState::Running { start_time, .. } = &self.state else {
            return match first_error {
                Some((_, e)) => Err(e),
                None => Ok(()),
            };
        };
        let duration = start_time.map(|t| t.elapsed());

        match first_error {
            Some((node_id, e)) => {
                self.transition_to(FlowState::Error {
                    error_msg: format!("{:#}", e),
                    node: Some(node_id.to_string()),
                })?;
                Err(e)
            }
            None => {
                self.transition_to(FlowState::Completed {
                    duration,
                    cancelled: self.cancel.is_cancelled(),
                })?;
                Ok(())
            }
        }
    }

    /// Cancel every node and wait for them to finalize.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.wait().await
    }

    pub fn monitor(&self) -> FlowMonitor {
        FlowMonitor::new(self.collector.clone())
    }

    pub fn node_metrics(&self, node: &str) -> Option<Arc<NodeMetrics>> {
        self.collector.get_node_metrics(node)
    }
}
