use nodeflow::channel;
use nodeflow::core::{DataMessage, HybridClock, Message, Payload, ToDescriptor};
use nodeflow::io::codec::{json_deserializer, json_serializer, u64_from_bytes, u64_to_bytes};
use nodeflow::io::{Inputs, Outputs};
use nodeflow::observability::{MemoryEventSink, NodeEvent, NodeMetrics};
use nodeflow::NodeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn clock() -> Arc<HybridClock> {
    Arc::new(HybridClock::new(Uuid::new_v4()))
}

#[tokio::test]
async fn test_fan_out_partial_failure() {
    let sink = MemoryEventSink::new();
    let metrics = Arc::new(NodeMetrics::new("src"));
    let mut outputs = Outputs::new("src", clock())
        .with_metrics(metrics.clone())
        .with_events(Arc::new(sink.clone()));

    let (tx_a, rx_a) = channel::new(Some(4));
    let (tx_b, rx_b) = channel::new(Some(4));
    let (tx_c, rx_c) = channel::new(Some(4));
    outputs.add("out", ToDescriptor::new("a", "in"), tx_a);
    outputs.add("out", ToDescriptor::new("b", "in"), tx_b);
    outputs.add("out", ToDescriptor::new("c", "in"), tx_c);
    drop(rx_b);

    let out = outputs.take_raw("out").unwrap();
    let report = out.send(Payload::from_static(b"hello"), None).await.unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());
    assert_eq!(out.destination_failures("b", "in"), Some(1));
    assert_eq!(out.destination_failures("a", "in"), Some(0));
    assert_eq!(out.destination_failures("c", "in"), Some(0));
    assert_eq!(metrics.send_failures(), 1);
    assert_eq!(metrics.errors_count(), 1);
    assert_eq!(metrics.messages_sent(), 1);

    assert_eq!(rx_a.recv().await.unwrap().payload().as_ref(), b"hello");
    assert_eq!(rx_c.recv().await.unwrap().payload().as_ref(), b"hello");

    let failed: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::SendFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    if let NodeEvent::SendFailed { destination, .. } = &failed[0] {
        assert_eq!(destination, &ToDescriptor::new("b", "in"));
    }

    // Each further send counts once more for the dead destination only.
    out.send(Payload::from_static(b"again"), None).await.unwrap();
    assert_eq!(out.destination_failures("b", "in"), Some(2));
    assert_eq!(out.destination_failures("a", "in"), Some(0));
}

#[tokio::test]
async fn test_fan_in_ends_when_all_upstreams_close() {
    let clock = clock();
    let mut inputs = Inputs::new("sink", clock.clone());
    let (tx_a, rx_a) = channel::new(Some(4));
    let (tx_b, rx_b) = channel::new(Some(4));
    inputs.add("in", rx_a);
    inputs.add("in", rx_b);

    let input = inputs.take_raw("in").unwrap();
    assert_eq!(input.channels(), 2);

    tx_a.send(DataMessage::new(Payload::from_static(b"a"), clock.new_timestamp()))
        .await
        .unwrap();
    tx_b.send(DataMessage::new(Payload::from_static(b"b"), clock.new_timestamp()))
        .await
        .unwrap();

    let mut got = vec![
        input.recv().await.unwrap().into_payload(),
        input.recv().await.unwrap().into_payload(),
    ];
    got.sort();
    assert_eq!(got, vec![Payload::from_static(b"a"), Payload::from_static(b"b")]);

    drop(tx_a);
    assert!(input.try_recv().unwrap().is_none());
    drop(tx_b);

    let err = input.recv().await.unwrap_err();
    assert!(matches!(err, NodeError::Disconnected { .. }));
    assert!(err.is_end_of_stream());
}

#[tokio::test]
async fn test_unwired_port() {
    let mut inputs = Inputs::new("n", clock());
    let mut outputs = Outputs::new("n", clock());

    assert!(matches!(
        inputs.take_raw("missing"),
        Err(NodeError::PortNotFound { .. })
    ));
    assert!(matches!(
        outputs.take("missing", u64_to_bytes),
        Err(NodeError::PortNotFound { .. })
    ));
}

#[tokio::test]
async fn test_typed_roundtrip_and_bad_payload() {
    let clock = clock();
    let (tx, rx) = channel::new(None);
    let mut outputs = Outputs::new("src", clock.clone());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    let out = outputs.take("out", u64_to_bytes).unwrap();

    let mut inputs = Inputs::new("sink", clock.clone());
    let (raw_tx, raw_rx) = channel::new(None);
    inputs.add("in", rx);
    inputs.add("in", raw_rx);
    let input = inputs.take("in", u64_from_bytes).unwrap();

    out.send(&300, Some(42)).await.unwrap();
    let Message::Data(msg) = input.recv().await.unwrap() else {
        panic!("expected data");
    };
    assert_eq!(*msg.payload(), 300);
    assert_eq!(msg.timestamp().logical_clock(), 42);

    // Nine bytes cannot be a u64; only that message fails.
    raw_tx
        .send(DataMessage::new(Payload::from(vec![1u8; 9]), clock.new_timestamp()))
        .await
        .unwrap();
    let err = input.recv().await.unwrap_err();
    assert!(matches!(err, NodeError::Deserialization { .. }));
    assert!(err.is_recoverable());

    out.send(&7, None).await.unwrap();
    assert_eq!(input.recv().await.unwrap().data().map(|m| *m.payload()), Some(7));
}

#[tokio::test]
async fn test_watermark_passes_through() {
    let clock = clock();
    let (tx, rx) = channel::new(None);
    let mut outputs = Outputs::new("src", clock.clone());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    let out = outputs.take_raw("out").unwrap();

    let mut inputs = Inputs::new("sink", clock);
    inputs.add("in", rx);
    let input = inputs.take("in", u64_from_bytes).unwrap();

    out.send_watermark().await.unwrap();
    assert!(matches!(input.recv().await.unwrap(), Message::Watermark(_)));
}

#[tokio::test]
async fn test_receive_merges_clock() {
    let remote = HybridClock::new(Uuid::new_v4());
    let local = clock();
    let (tx, rx) = channel::new(None);
    let mut inputs = Inputs::new("sink", local.clone());
    inputs.add("in", rx);
    let input = inputs.take_raw("in").unwrap();

    let far_future = local.now() + Duration::from_secs(3600).as_nanos() as u64;
    tx.send(DataMessage::new(Payload::new(), remote.timestamp_at(far_future)))
        .await
        .unwrap();
    input.recv().await.unwrap();

    assert!(local.new_timestamp().logical_clock() > far_future);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
}

#[tokio::test]
async fn test_json_codec_ports() {
    let clock = clock();
    let (tx, rx) = channel::new(Some(2));
    let mut outputs = Outputs::new("src", clock.clone());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    let out = outputs.take("out", json_serializer::<Reading>()).unwrap();

    let mut inputs = Inputs::new("sink", clock);
    inputs.add("in", rx);
    let input = inputs.take("in", json_deserializer::<Reading>()).unwrap();

    let reading = Reading {
        sensor: "t1".into(),
        value: 21.5,
    };
    out.send(&reading, None).await.unwrap();
    let received = input.recv().await.unwrap().data().unwrap().into_payload();
    assert_eq!(received, reading);
}

#[tokio::test]
async fn test_call_tx_without_callback() {
    let (tx, _rx) = channel::new(None);
    let mut outputs = Outputs::new("src", clock());
    outputs.add("out", ToDescriptor::new("sink", "in"), tx);
    let out = outputs.take_raw("out").unwrap();

    assert!(matches!(
        out.call_tx().await,
        Err(NodeError::NoCallback { .. })
    ));
    assert!(!out.is_callback_mode());
    assert_eq!(out.descriptor().node.as_ref(), "src");
}
