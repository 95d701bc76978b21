use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nodeflow::channel;
use nodeflow::core::{
    Configuration, Context, DataMessage, E2EDeadline, FromDescriptor, HybridClock, Operator,
    Payload, PortId, ToDescriptor, Tokens,
};
use nodeflow::engine::{RuleDriven, RuleOperator};
use nodeflow::io::{Inputs, Outputs};
use nodeflow::observability::{MemoryEventSink, NodeEvent, NodeMetrics};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

fn deadline(from: (&str, &str), to: (&str, &str), ms: u64) -> E2EDeadline {
    E2EDeadline::new(
        FromDescriptor::new(from.0, from.1),
        ToDescriptor::new(to.0, to.1),
        Duration::from_millis(ms),
    )
}

#[tokio::test]
async fn test_e2e_miss_recorded_at_destination() {
    let clock = Arc::new(HybridClock::new(Uuid::new_v4()));
    let metrics = Arc::new(NodeMetrics::new("sink"));
    let events = MemoryEventSink::new();

    let (tx, rx) = channel::new(None);
    let mut outputs = Outputs::new("src", clock.clone());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    outputs.add_e2e_deadline(deadline(("src", "out"), ("sink", "in"), 1));
    // A deadline starting at another node's port is not attached here.
    outputs.add_e2e_deadline(deadline(("other", "out"), ("sink", "in"), 1));
    let out = outputs.take_raw("out").unwrap();

    let mut inputs = Inputs::new("sink", clock.clone())
        .with_metrics(metrics.clone())
        .with_events(Arc::new(events.clone()));
    inputs.add("in", rx);
    let input = inputs.take_raw("in").unwrap();

    out.send(Payload::from_static(b"x"), None).await.unwrap();
    sleep(Duration::from_millis(5)).await;
    let msg = input.recv().await.unwrap();

    assert_eq!(msg.end_to_end_deadlines().len(), 1);
    let misses = msg.missed_end_to_end_deadlines();
    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].from, FromDescriptor::new("src", "out"));
    assert_eq!(misses[0].to, ToDescriptor::new("sink", "in"));
    assert!(misses[0].end - misses[0].start >= 5_000_000);

    assert_eq!(metrics.e2e_deadline_misses(), 1);
    assert!(events
        .events()
        .iter()
        .any(|e| matches!(e, NodeEvent::E2EDeadlineMissed { .. })));
}

#[tokio::test]
async fn test_e2e_within_budget_and_watermarks_untracked() {
    let clock = Arc::new(HybridClock::new(Uuid::new_v4()));
    let (tx, rx) = channel::new(None);
    let mut outputs = Outputs::new("src", clock.clone());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    outputs.add_e2e_deadline(deadline(("src", "out"), ("sink", "in"), 10_000));
    let out = outputs.take_raw("out").unwrap();

    let mut inputs = Inputs::new("sink", clock);
    inputs.add("in", rx);
    let input = inputs.take_raw("in").unwrap();

    out.send(Payload::from_static(b"x"), None).await.unwrap();
    let msg = input.recv().await.unwrap();
    assert_eq!(msg.end_to_end_deadlines().len(), 1);
    assert!(msg.missed_end_to_end_deadlines().is_empty());

    out.send_watermark().await.unwrap();
    let wm = input.recv().await.unwrap();
    assert!(wm.is_watermark());
    assert!(wm.end_to_end_deadlines().is_empty());
}

/// Forwards its input after a pause.
struct Relay;

#[async_trait]
impl RuleOperator for Relay {
    type State = ();

    fn initialize(&self, _ctx: &Context, _config: &Configuration) -> Result<()> {
        Ok(())
    }

    fn input_rule(&self, _ctx: &Context, _state: &mut (), tokens: &mut Tokens) -> Result<bool> {
        Ok(tokens.all_ready())
    }

    async fn run(
        &self,
        _ctx: &Context,
        _state: &mut (),
        inputs: &mut HashMap<PortId, DataMessage>,
    ) -> Result<HashMap<PortId, Payload>> {
        sleep(Duration::from_millis(3)).await;
        let msg = inputs.remove("in").ok_or_else(|| anyhow!("no input"))?;
        Ok(HashMap::from([(PortId::from("out"), msg.into_payload())]))
    }
}

#[tokio::test]
async fn test_misses_accumulate_in_path_order() {
    let clock = Arc::new(HybridClock::new(Uuid::new_v4()));
    let first = deadline(("src", "out"), ("relay", "in"), 1);
    let second = deadline(("relay", "out"), ("sink", "in"), 1);

    let (src_tx, relay_rx) = channel::new(None);
    let mut src_outputs = Outputs::new("src", clock.clone());
    src_outputs.add("out", ToDescriptor::new("relay", "in"), src_tx);
    src_outputs.add_e2e_deadline(first.clone());
    let src = src_outputs.take_raw("out").unwrap();

    let (relay_tx, sink_rx) = channel::new(None);
    let mut relay_inputs = Inputs::new("relay", clock.clone());
    relay_inputs.add("in", relay_rx);
    let mut relay_outputs = Outputs::new("relay", clock.clone());
    relay_outputs.add("out", ToDescriptor::new("sink", "in"), relay_tx);
    relay_outputs.add_e2e_deadline(second.clone());
    let mut relay = RuleDriven::new(
        Relay,
        &Context::for_node("relay"),
        &json!({}),
        relay_inputs,
        relay_outputs,
    )
    .unwrap();

    let mut sink_inputs = Inputs::new("sink", clock);
    sink_inputs.add("in", sink_rx);
    let sink = sink_inputs.take_raw("in").unwrap();

    src.send(Payload::from_static(b"payload"), None).await.unwrap();
    sleep(Duration::from_millis(3)).await;
    relay.iteration().await.unwrap();
    sleep(Duration::from_millis(3)).await;
    let msg = sink.recv().await.unwrap();

    assert_eq!(msg.payload().as_ref(), b"payload");
    let misses = msg.missed_end_to_end_deadlines();
    assert_eq!(misses.len(), 2);
    assert_eq!((&misses[0].from, &misses[0].to), (&first.from, &first.to));
    assert_eq!((&misses[1].from, &misses[1].to), (&second.from, &second.to));
    assert!(misses[0].end <= misses[1].start);
}
