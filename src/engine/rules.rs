//! Rule-driven operators: an explicit state object plus input rule, run and
//! output rule, executed by [`RuleDriven`] as an ordinary [`Operator`].

use crate::core::deadline::check_local_deadline;
use crate::core::{
    Configuration, Context, DataMessage, InputToken, LocalDeadlineMiss, NodeOutput, Operator,
    Payload, PortId, TokenAction, Tokens,
};
use crate::error::NodeError;
use crate::io::{InputRaw, Inputs, OutputRaw, Outputs};
use crate::observability::{NodeEvent, NodeMetrics, SharedEventSink};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::{select_all, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait RuleOperator: Send + Sync + 'static {
    type State: Send;

    fn initialize(&self, ctx: &Context, config: &Configuration) -> Result<Self::State>;

    /// Decide, per token, whether to consume, keep or drop it, and whether
    /// `run` should execute this iteration.
    ///
    /// Kept messages are offered again on the next round without waiting for
    /// new data. When every input holds a kept message the rule is re-evaluated
    /// right away, so a rule that keeps everything regardless of `state` spins
    /// (yielding between rounds) until upstream data or cancellation ends it.
    fn input_rule(&self, ctx: &Context, state: &mut Self::State, tokens: &mut Tokens)
        -> Result<bool>;

    async fn run(
        &self,
        ctx: &Context,
        state: &mut Self::State,
        inputs: &mut HashMap<PortId, DataMessage>,
    ) -> Result<HashMap<PortId, Payload>>;

    /// Shape what `run` produced. `deadline_miss` is set when `run` overran
    /// the node's local deadline.
    fn output_rule(
        &self,
        _ctx: &Context,
        _state: &mut Self::State,
        outputs: HashMap<PortId, Payload>,
        _deadline_miss: Option<LocalDeadlineMiss>,
    ) -> Result<HashMap<PortId, NodeOutput>> {
        Ok(outputs
            .into_iter()
            .map(|(port, payload)| (port, NodeOutput::Data(payload)))
            .collect())
    }

    fn finalize(&self, _state: &mut Self::State) -> Result<()> {
        Ok(())
    }
}

/// Runs a [`RuleOperator`] one token round per iteration.
pub struct RuleDriven<O: RuleOperator> {
    operator: O,
    state: O::State,
    ctx: Context,
    inputs: Vec<InputRaw>,
    outputs: HashMap<PortId, OutputRaw>,
    kept: HashMap<PortId, DataMessage>,
    /// Set after a short-circuit: the next round waits for new data.
    needs_fresh: bool,
    metrics: Arc<NodeMetrics>,
    events: SharedEventSink,
}

impl<O: RuleOperator> RuleDriven<O> {
    pub fn new(
        operator: O,
        ctx: &Context,
        config: &Configuration,
        mut inputs: Inputs,
        mut outputs: Outputs,
    ) -> Result<Self> {
        let state = operator.initialize(ctx, config)?;
        let metrics = inputs.metrics().clone();
        let events = inputs.events().clone();

        Ok(Self {
            operator,
            state,
            ctx: ctx.clone(),
            inputs: inputs.take_all_raw(),
            outputs: outputs
                .take_all_raw()
                .into_iter()
                .map(|output| (output.port_id().clone(), output))
                .collect(),
            kept: HashMap::new(),
            needs_fresh: false,
            metrics,
            events,
        })
    }

    pub fn state(&self) -> &O::State {
        &self.state
    }

    /// Messages held back by `Keep`, waiting for the next iteration.
    pub fn kept(&self) -> &HashMap<PortId, DataMessage> {
        &self.kept
    }

    /// Kept messages go first so they precede later messages of their channel.
    fn collect_tokens(&mut self) -> Result<(Tokens, usize)> {
        let mut tokens = Tokens::new();
        let mut fresh = 0;

        for input in &self.inputs {
            let port = input.port_id().clone();
            let token = match self.kept.remove(&port) {
                Some(msg) => InputToken::ready(msg),
                None => match input.try_recv() {
                    Ok(Some(msg)) => {
                        fresh += 1;
                        InputToken::ready(msg)
                    }
                    Ok(None) | Err(NodeError::Disconnected { .. }) => InputToken::pending(),
                    Err(e) => return Err(e.into()),
                },
            };
            tokens.insert(port, token);
        }

        Ok((tokens, fresh))
    }
}

/// Wait for a message on any input whose token is pending.
async fn await_pending(
    inputs: &[InputRaw],
    tokens: &Tokens,
) -> Result<Option<(PortId, DataMessage)>> {
    let mut pending: Vec<BoxFuture<'_, (PortId, crate::error::Result<DataMessage>)>> = inputs
        .iter()
        .filter(|input| tokens.get(input.port_id()).is_some_and(|t| !t.is_ready()))
        .map(|input| async move { (input.port_id().clone(), input.recv().await) }.boxed())
        .collect();

    if pending.is_empty() {
        return Ok(None);
    }

    let mut last_port = None;
    while !pending.is_empty() {
        let ((port, result), _, rest) = select_all(pending).await;
        match result {
            Ok(msg) => return Ok(Some((port, msg))),
            Err(NodeError::Disconnected { .. }) => {
                last_port = Some(port);
                pending = rest;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(NodeError::Disconnected {
        port: last_port.unwrap_or_else(|| "".into()),
    }
    .into())
}

/// Send what the output rule decided, carrying the deadline metadata of the consumed inputs.
async fn emit(
    targets: &HashMap<PortId, OutputRaw>,
    outputs: HashMap<PortId, NodeOutput>,
    lineage: &[DataMessage],
) -> Result<()> {
    for (port, output) in outputs {
        let target = targets
            .get(&port)
            .ok_or_else(|| NodeError::PortNotFound { port: port.clone() })?;

        match output {
            NodeOutput::Data(payload) => {
                let mut msg = target.new_message(payload);
                for consumed in lineage {
                    msg.inherit_deadlines(consumed);
                }
                target.send_message(msg).await?;
            }
            NodeOutput::Watermark => {
                target.send_watermark().await?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl<O: RuleOperator> Operator for RuleDriven<O> {
    async fn iteration(&mut self) -> Result<()> {
        let (mut tokens, fresh) = self.collect_tokens()?;

        if fresh == 0 && (self.needs_fresh || !tokens.any_ready()) {
            match await_pending(&self.inputs, &tokens).await? {
                Some((port, msg)) => tokens.insert(port, InputToken::ready(msg)),
                None if !tokens.any_ready() => {
                    return Err(NodeError::Disconnected { port: "".into() }.into())
                }
                None => {}
            }
        }

        let ready = self
            .operator
            .input_rule(&self.ctx, &mut self.state, &mut tokens)?;

        let mut consumed = HashMap::new();
        for (port, token) in tokens {
            let Some((action, msg)) = token.resolve() else {
                continue;
            };
            match action {
                TokenAction::Keep => {
                    self.kept.insert(port, msg);
                }
                TokenAction::Consume if ready => {
                    consumed.insert(port, msg);
                }
                // Consume without a run: hold it rather than lose it.
                TokenAction::Consume => {
                    self.kept.insert(port, msg);
                }
                TokenAction::Drop => {}
            }
        }

        if !ready {
            self.needs_fresh = true;
            self.metrics.record_short_circuit();
            tokio::task::yield_now().await;
            return Ok(());
        }
        self.needs_fresh = false;

        let lineage: Vec<DataMessage> = consumed.values().cloned().collect();
        let start = Instant::now();
        let produced = self
            .operator
            .run(&self.ctx, &mut self.state, &mut consumed)
            .await?;

        let deadline_miss = check_local_deadline(self.ctx.local_deadline(), start);
        if let Some(miss) = deadline_miss {
            self.metrics.record_local_deadline_miss();
            self.events.record(NodeEvent::LocalDeadlineMissed {
                node: self.ctx.node_id().clone(),
                miss,
            });
        }

        let outputs = self
            .operator
            .output_rule(&self.ctx, &mut self.state, produced, deadline_miss)?;
        emit(&self.outputs, outputs, &lineage).await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.operator.finalize(&mut self.state)
    }
}
