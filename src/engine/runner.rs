use crate::core::context::{InputCallbackEntry, OutputCallbackEntry};
use crate::core::{Context, NodeId, NodeInstance};
use crate::observability::{default_sink, NodeEvent, NodeMetrics, SharedEventSink};
use crate::resilience::{ErrorPolicy, IterationOutcome, ResilientNode};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest production window an output callback can be polled at.
const MIN_PRODUCTION_WINDOW: Duration = Duration::from_millis(1);

/// Why a node loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every upstream link is gone.
    EndOfStream,
    Cancelled,
}

/// Drives one node: the iteration loop, its callbacks and a single `finalize`.
pub struct NodeRunner {
    ctx: Context,
    node: NodeInstance,
    metrics: Arc<NodeMetrics>,
    events: SharedEventSink,
    error_policy: ErrorPolicy,
    cancel: CancellationToken,
}

impl NodeRunner {
    pub fn new(ctx: Context, node: NodeInstance) -> Self {
        let metrics = Arc::new(NodeMetrics::new(ctx.node_id().as_ref()));
        Self {
            ctx,
            node,
            metrics,
            events: default_sink(),
            error_policy: ErrorPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        self.ctx.node_id()
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Token that stops this runner when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self) -> JoinHandle<Result<StopReason>> {
        tokio::spawn(self.run())
    }

    /// Loop until end-of-stream, cancellation or a fatal error, then finalize once.
    pub async fn run(self) -> Result<StopReason> {
        let Self {
            mut ctx,
            node,
            metrics,
            events,
            error_policy,
            cancel,
        } = self;

        ctx.seal();
        let node_id = ctx.node_id().clone();
        let mut node = ResilientNode::new(
            node_id.clone(),
            node,
            metrics.clone(),
            events.clone(),
            error_policy,
        );
        events.record(NodeEvent::Started {
            node: node_id.clone(),
        });

        let drivers = cancel.child_token();
        let mut input_drivers = JoinSet::new();
        for entry in ctx.input_callbacks() {
            input_drivers.spawn(drive_input(entry.clone(), drivers.clone()));
        }
        let mut output_drivers = JoinSet::new();
        for entry in ctx.output_callbacks() {
            output_drivers.spawn(drive_output(
                entry.clone(),
                node_id.clone(),
                metrics.clone(),
                events.clone(),
                drivers.clone(),
            ));
        }
        // A node fed only by callbacks has no iteration that could report the end of its inputs.
        let watch_inputs = !input_drivers.is_empty() && !ctx.has_polling_inputs();

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(StopReason::Cancelled),
                _ = drained(&mut input_drivers), if watch_inputs => break Ok(StopReason::EndOfStream),
                outcome = node.iteration() => match outcome {
                    IterationOutcome::Continue => {}
                    IterationOutcome::EndOfStream => break Ok(StopReason::EndOfStream),
                    IterationOutcome::Failed(e) => break Err(e),
                },
            }
        };

        if matches!(result, Ok(StopReason::EndOfStream)) && !input_drivers.is_empty() {
            // Polled inputs are done; let callback inputs deliver what is still upstream.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = drained(&mut input_drivers) => {}
            }
        }
        drivers.cancel();
        drained(&mut input_drivers).await;
        drained(&mut output_drivers).await;

        let finalized = node.finalize().await;
        events.record(NodeEvent::Finalized {
            node: node_id.clone(),
        });

        match (result, finalized) {
            (Ok(reason), Ok(())) => {
                tracing::debug!(node = %node_id, reason = ?reason, "node stopped");
                Ok(reason)
            }
            (Ok(_), Err(e)) => Err(e.context(format!("Node {} failed to finalize", node_id))),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(finalize_error)) => {
                tracing::warn!(node = %node_id, error = %finalize_error, "finalize failed after iteration error");
                Err(e)
            }
        }
    }
}

async fn drained(set: &mut JoinSet<()>) {
    while set.join_next().await.is_some() {}
}

async fn drive_input(entry: InputCallbackEntry, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = entry.input.dispatch_next() => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
}

async fn drive_output(
    entry: OutputCallbackEntry,
    node_id: NodeId,
    metrics: Arc<NodeMetrics>,
    events: SharedEventSink,
    cancel: CancellationToken,
) {
    let window = entry.timeout.max(MIN_PRODUCTION_WINDOW);
    let mut interval = tokio::time::interval_at(Instant::now() + window, window);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let scheduled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            at = interval.tick() => at,
        };

        let late_by = Instant::now().saturating_duration_since(scheduled);
        if late_by >= window {
            metrics.record_missed_production_window();
            events.record(NodeEvent::ProductionWindowMissed {
                node: node_id.clone(),
                port: entry.output.port_id().clone(),
                late_by,
            });
        }

        match entry.output.call_tx().await {
            Ok(report) if report.delivered == 0 && report.failed > 0 => {
                tracing::debug!(node = %node_id, port = %entry.output.port_id(), "every destination is gone, stopping output callback");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(node = %node_id, error = %e, "output callback stopped");
                break;
            }
        }
    }
}
