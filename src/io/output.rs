use super::PortEnv;
use crate::channel::Sender;
use crate::core::{
    DataMessage, E2EDeadline, FromDescriptor, HybridClock, NodeId, OutputCallback, Payload,
    PortId, Timestamp, ToDescriptor,
};
use crate::error::{NodeError, Result};
use crate::observability::{NodeEvent, NodeMetrics, SharedEventSink};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Serializer<T> = Arc<dyn Fn(&T) -> anyhow::Result<Vec<u8>> + Send + Sync>;

/// Every output port wired from a node, before the node claims them.
pub struct Outputs {
    env: PortEnv,
    ports: HashMap<PortId, Vec<Destination>>,
    deadlines: Vec<E2EDeadline>,
}

impl Outputs {
    pub fn new(node_id: impl Into<NodeId>, clock: Arc<HybridClock>) -> Self {
        Self {
            env: PortEnv::new(node_id.into(), clock),
            ports: HashMap::new(),
            deadlines: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.env.metrics = metrics;
        self
    }

    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.env.events = events;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.env.node_id
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.env.metrics
    }

    /// Wire one more downstream destination to `port`.
    pub fn add(&mut self, port: impl Into<PortId>, to: ToDescriptor, sender: Sender<DataMessage>) {
        self.ports.entry(port.into()).or_default().push(Destination {
            to,
            sender,
            failures: AtomicU64::new(0),
        });
    }

    /// Track `deadline` on messages leaving through its `from` port.
    pub fn add_e2e_deadline(&mut self, deadline: E2EDeadline) {
        self.deadlines.push(deadline);
    }

    pub fn keys(&self) -> impl Iterator<Item = &PortId> {
        self.ports.keys()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn take_raw(&mut self, port: &str) -> Result<OutputRaw> {
        let (port_id, destinations) = self
            .ports
            .remove_entry(port)
            .ok_or_else(|| NodeError::PortNotFound { port: port.into() })?;
        Ok(self.build(port_id, destinations))
    }

    pub fn take<T>(
        &mut self,
        port: &str,
        serializer: impl Fn(&T) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Result<Output<T>> {
        Ok(Output {
            raw: self.take_raw(port)?,
            serializer: Arc::new(serializer),
        })
    }

    /// Claim every remaining port at once.
    pub fn take_all_raw(&mut self) -> Vec<OutputRaw> {
        let ports: Vec<_> = self.ports.drain().collect();
        ports
            .into_iter()
            .map(|(port_id, destinations)| self.build(port_id, destinations))
            .collect()
    }

    fn build(&self, port_id: PortId, destinations: Vec<Destination>) -> OutputRaw {
        let from = FromDescriptor::new(self.env.node_id.clone(), port_id.clone());
        let deadlines = self
            .deadlines
            .iter()
            .filter(|deadline| deadline.from == from)
            .cloned()
            .collect();
        OutputRaw {
            port_id,
            from,
            destinations,
            deadlines,
            callback: None,
            env: self.env.clone(),
        }
    }
}

/// One downstream input fed by an output port.
pub struct Destination {
    to: ToDescriptor,
    sender: Sender<DataMessage>,
    failures: AtomicU64,
}

impl Destination {
    pub fn to(&self) -> &ToDescriptor {
        &self.to
    }

    /// Messages this destination could not be handed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Outcome of a fan-out. A partial failure is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub delivered: usize,
    pub failed: usize,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Untyped output port.
pub struct OutputRaw {
    port_id: PortId,
    from: FromDescriptor,
    destinations: Vec<Destination>,
    deadlines: Vec<E2EDeadline>,
    callback: Option<OutputCallback>,
    env: PortEnv,
}

impl OutputRaw {
    pub fn port_id(&self) -> &PortId {
        &self.port_id
    }

    /// This port as the origin of end-to-end deadlines.
    pub fn descriptor(&self) -> &FromDescriptor {
        &self.from
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Failure count of the destination `node.input`, if it is wired here.
    pub fn destination_failures(&self, node: &str, input: &str) -> Option<u64> {
        self.destinations
            .iter()
            .find(|d| d.to.node.as_ref() == node && d.to.input.as_ref() == input)
            .map(Destination::failures)
    }

    pub fn is_callback_mode(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn into_callback(&mut self, callback: OutputCallback) {
        self.callback = Some(callback);
    }

    /// Stamp `payload` and hand it to every destination.
    ///
    /// `timestamp` overrides the logical time; the node clock is used otherwise.
    pub async fn send(
        &self,
        payload: impl Into<Payload>,
        timestamp: Option<u64>,
    ) -> Result<SendReport> {
        self.ensure_polling()?;
        let msg = DataMessage::new(payload.into(), self.stamp(timestamp));
        Ok(self.deliver(msg, false).await)
    }

    /// Send `payload` as derived from `parent`: a fresh timestamp, with the
    /// deadlines tracked and missed so far on `parent` carried along.
    pub async fn send_derived<U>(
        &self,
        payload: impl Into<Payload>,
        parent: &DataMessage<U>,
    ) -> Result<SendReport> {
        self.ensure_polling()?;
        let mut msg = self.new_message(payload.into());
        msg.inherit_deadlines(parent);
        Ok(self.deliver(msg, false).await)
    }

    /// Forward an existing message, keeping its timestamp and deadline metadata.
    pub async fn send_message(&self, msg: DataMessage) -> Result<SendReport> {
        self.ensure_polling()?;
        Ok(self.deliver(msg, false).await)
    }

    pub async fn send_watermark(&self) -> Result<SendReport> {
        self.ensure_polling()?;
        let msg = DataMessage::watermark(self.env.clock.new_timestamp());
        Ok(self.deliver(msg, false).await)
    }

    /// Produce one payload through the registered callback and deliver it
    /// straight to callback-mode receivers.
    pub async fn call_tx(&self) -> Result<SendReport> {
        let callback = self.callback.clone().ok_or_else(|| NodeError::NoCallback {
            port: self.port_id.clone(),
        })?;
        let msg = DataMessage::new(callback(), self.env.clock.new_timestamp());
        Ok(self.deliver(msg, true).await)
    }

    /// A fresh message stamped by the node clock, not yet sent.
    pub(crate) fn new_message(&self, payload: Payload) -> DataMessage {
        DataMessage::new(payload, self.env.clock.new_timestamp())
    }

    fn ensure_polling(&self) -> Result<()> {
        if self.callback.is_some() {
            return Err(NodeError::CallbackMode {
                port: self.port_id.clone(),
            });
        }
        Ok(())
    }

    fn stamp(&self, timestamp: Option<u64>) -> Timestamp {
        match timestamp {
            Some(logical_clock) => self.env.clock.timestamp_at(logical_clock),
            None => self.env.clock.new_timestamp(),
        }
    }

    fn attach_deadlines(&self, msg: &mut DataMessage) {
        if msg.is_watermark() || self.deadlines.is_empty() {
            return;
        }
        let start = Timestamp::new(self.env.clock.now(), self.env.clock.id());
        for deadline in &self.deadlines {
            let tracked = msg
                .end_to_end_deadlines()
                .iter()
                .any(|s| s.from == deadline.from && s.to == deadline.to);
            if !tracked {
                msg.push_end_to_end_deadline(deadline.start(start));
            }
        }
    }

    async fn deliver(&self, mut msg: DataMessage, direct: bool) -> SendReport {
        self.attach_deadlines(&mut msg);

        let mut report = SendReport::default();
        for destination in &self.destinations {
            let result = if direct {
                destination.sender.forward(msg.clone()).await
            } else {
                destination.sender.send(msg.clone()).await
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    destination.failures.fetch_add(1, Ordering::Relaxed);
                    self.env.metrics.record_send_failure();
                    self.env.events.record(NodeEvent::SendFailed {
                        node: self.env.node_id.clone(),
                        port: self.port_id.clone(),
                        destination: destination.to.clone(),
                    });
                    report.failed += 1;
                }
            }
        }

        if report.delivered > 0 {
            self.env.metrics.record_sent();
        }
        report
    }
}

/// Typed output port.
pub struct Output<T> {
    raw: OutputRaw,
    serializer: Serializer<T>,
}

impl<T> Output<T> {
    pub fn port_id(&self) -> &PortId {
        self.raw.port_id()
    }

    pub fn raw(&self) -> &OutputRaw {
        &self.raw
    }

    pub fn into_raw(self) -> OutputRaw {
        self.raw
    }

    pub async fn send(&self, value: &T, timestamp: Option<u64>) -> Result<SendReport> {
        let bytes = self.serialize(value)?;
        self.raw.send(bytes, timestamp).await
    }

    /// Send `value` computed from `parent`, keeping its deadline lineage.
    pub async fn send_from<U>(&self, value: &T, parent: &DataMessage<U>) -> Result<SendReport> {
        let bytes = self.serialize(value)?;
        self.raw.send_derived(bytes, parent).await
    }

    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        (self.serializer)(value).map_err(|source| NodeError::Serialization {
            port: self.raw.port_id.clone(),
            source,
        })
    }
}
