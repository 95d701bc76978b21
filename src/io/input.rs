use super::{PollingInputs, PortEnv};
use crate::channel::{Receiver, RecvError, TryRecvError};
use crate::core::{
    DataMessage, HybridClock, InputCallback, Message, NodeId, PortId, ToDescriptor,
};
use crate::error::{NodeError, Result};
use crate::observability::{NodeEvent, NodeMetrics, SharedEventSink};
use futures::future::{select_all, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub type Deserializer<T> = Arc<dyn Fn(&[u8]) -> anyhow::Result<T> + Send + Sync>;

/// Every input port wired to a node, before the node claims them.
pub struct Inputs {
    env: PortEnv,
    ports: HashMap<PortId, Vec<Receiver<DataMessage>>>,
}

impl Inputs {
    pub fn new(node_id: impl Into<NodeId>, clock: Arc<HybridClock>) -> Self {
        Self {
            env: PortEnv::new(node_id.into(), clock),
            ports: HashMap::new(),
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

    pub(crate) fn events(&self) -> &SharedEventSink {
        &self.env.events
    }

    /// Wire one more upstream channel into `port`.
    pub fn add(&mut self, port: impl Into<PortId>, receiver: Receiver<DataMessage>) {
        self.ports.entry(port.into()).or_default().push(receiver);
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

    pub fn take_raw(&mut self, port: &str) -> Result<InputRaw> {
        let (port_id, receivers) = self
            .ports
            .remove_entry(port)
            .ok_or_else(|| NodeError::PortNotFound { port: port.into() })?;
        Ok(InputRaw::new(port_id, receivers, self.env.clone()))
    }

    pub fn take<T>(
        &mut self,
        port: &str,
        deserializer: impl Fn(&[u8]) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Result<Input<T>> {
        Ok(Input {
            raw: self.take_raw(port)?,
            deserializer: Arc::new(deserializer),
        })
    }

    /// Claim every remaining port at once.
    pub fn take_all_raw(&mut self) -> Vec<InputRaw> {
        let env = self.env.clone();
        self.ports
            .drain()
            .map(|(port_id, receivers)| InputRaw::new(port_id, receivers, env.clone()))
            .collect()
    }
}

#[derive(Clone)]
struct ReceiveHook {
    to: ToDescriptor,
    env: PortEnv,
}

impl ReceiveHook {
    fn on_receive(&self, mut msg: DataMessage) -> DataMessage {
        self.env.clock.update_with_timestamp(msg.timestamp());
        self.env.metrics.record_received();

        if !msg.end_to_end_deadlines().is_empty() {
            let already_missed = msg.missed_end_to_end_deadlines().len();
            let missed = msg.check_end_to_end_deadlines(&self.to, self.env.clock.now());
            if missed > 0 {
                self.env.metrics.record_e2e_deadline_misses(missed as u64);
                for miss in &msg.missed_end_to_end_deadlines()[already_missed..] {
                    self.env.events.record(NodeEvent::E2EDeadlineMissed {
                        node: self.env.node_id.clone(),
                        miss: miss.clone(),
                    });
                }
            }
        }
        msg
    }
}

/// Untyped input port. Several upstream channels may feed it; the first
/// message ready wins and simultaneous arrivals are served in rotation.
pub struct InputRaw {
    port_id: PortId,
    receivers: Vec<Receiver<DataMessage>>,
    next: AtomicUsize,
    callback_mode: AtomicBool,
    hook: ReceiveHook,
}

impl InputRaw {
    fn new(port_id: PortId, receivers: Vec<Receiver<DataMessage>>, env: PortEnv) -> Self {
        let to = ToDescriptor::new(env.node_id.clone(), port_id.clone());
        env.polling.acquire();
        Self {
            port_id,
            receivers,
            next: AtomicUsize::new(0),
            callback_mode: AtomicBool::new(false),
            hook: ReceiveHook { to, env },
        }
    }

    pub fn port_id(&self) -> &PortId {
        &self.port_id
    }

    /// Number of upstream channels feeding this port.
    pub fn channels(&self) -> usize {
        self.receivers.len()
    }

    fn rotation(&self) -> impl Iterator<Item = usize> {
        let len = self.receivers.len();
        let start = self.next.load(Ordering::Relaxed) % len.max(1);
        (0..len).map(move |offset| (start + offset) % len)
    }

    fn served(&self, index: usize) {
        self.next.store(index + 1, Ordering::Relaxed);
    }

    /// Wait for the next message on any upstream channel.
    ///
    /// Fails with [`NodeError::Disconnected`] once every channel is closed and drained.
    pub async fn recv(&self) -> Result<DataMessage> {
        let mut pending: Vec<BoxFuture<'_, (usize, std::result::Result<DataMessage, RecvError>)>> =
            self.rotation()
                .map(|index| {
                    let receiver = &self.receivers[index];
                    async move { (index, receiver.recv().await) }.boxed()
                })
                .collect();

        while !pending.is_empty() {
            let ((index, result), _, rest) = select_all(pending).await;
            match result {
                Ok(msg) => {
                    self.served(index);
                    return Ok(self.hook.on_receive(msg));
                }
                Err(RecvError::Disconnected) => pending = rest,
                Err(_) => {
                    return Err(NodeError::CallbackMode {
                        port: self.port_id.clone(),
                    })
                }
            }
        }

        Err(NodeError::Disconnected {
            port: self.port_id.clone(),
        })
    }

    /// Next message if one is already queued, without waiting.
    pub fn try_recv(&self) -> Result<Option<DataMessage>> {
        let mut disconnected = 0;
        for index in self.rotation() {
            match self.receivers[index].try_recv() {
                Ok(msg) => {
                    self.served(index);
                    return Ok(Some(self.hook.on_receive(msg)));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => disconnected += 1,
                Err(TryRecvError::CallbackMode) => {
                    return Err(NodeError::CallbackMode {
                        port: self.port_id.clone(),
                    })
                }
            }
        }

        if disconnected == self.receivers.len() {
            Err(NodeError::Disconnected {
                port: self.port_id.clone(),
            })
        } else {
            Ok(None)
        }
    }

    /// Tracker shared by every input handle of the same node.
    pub(crate) fn polling_inputs(&self) -> PollingInputs {
        self.hook.env.polling.clone()
    }

    pub(crate) fn into_callback(&self, callback: InputCallback) {
        if !self.callback_mode.swap(true, Ordering::AcqRel) {
            self.hook.env.polling.release();
        }
        for receiver in &self.receivers {
            let hook = self.hook.clone();
            let callback = callback.clone();
            receiver.into_callback(move |msg| callback(hook.on_receive(msg)));
        }
    }

    /// Deliver what is queued on every channel to the registered callback.
    pub fn dispatch(&self) -> usize {
        self.receivers.iter().map(Receiver::dispatch).sum()
    }

    /// Wait for one message on any channel and deliver it to the registered callback.
    pub async fn dispatch_next(&self) -> Result<()> {
        let mut pending: Vec<BoxFuture<'_, std::result::Result<(), RecvError>>> = self
            .rotation()
            .map(|index| self.receivers[index].dispatch_next().boxed())
            .collect();

        while !pending.is_empty() {
            let (result, _, rest) = select_all(pending).await;
            match result {
                Ok(()) => return Ok(()),
                Err(RecvError::Disconnected) => pending = rest,
                Err(_) => {
                    return Err(NodeError::NoCallback {
                        port: self.port_id.clone(),
                    })
                }
            }
        }

        Err(NodeError::Disconnected {
            port: self.port_id.clone(),
        })
    }
}

impl Drop for InputRaw {
    fn drop(&mut self) {
        if !*self.callback_mode.get_mut() {
            self.hook.env.polling.release();
        }
    }
}

/// Typed input port.
pub struct Input<T> {
    raw: InputRaw,
    deserializer: Deserializer<T>,
}

impl<T> Input<T> {
    pub fn port_id(&self) -> &PortId {
        self.raw.port_id()
    }

    pub fn raw(&self) -> &InputRaw {
        &self.raw
    }

    pub fn into_raw(self) -> InputRaw {
        self.raw
    }

    /// Wait for the next message. A payload the deserializer rejects fails
    /// this call only; the port stays usable.
    pub async fn recv(&self) -> Result<Message<T>> {
        let msg = self.raw.recv().await?;
        self.decode(msg)
    }

    pub fn try_recv(&self) -> Result<Option<Message<T>>> {
        self.raw.try_recv()?.map(|msg| self.decode(msg)).transpose()
    }

    fn decode(&self, msg: DataMessage) -> Result<Message<T>> {
        if msg.is_watermark() {
            return Ok(Message::Watermark(*msg.timestamp()));
        }
        msg.try_map(|bytes| (self.deserializer)(&bytes))
            .map(Message::Data)
            .map_err(|source| NodeError::Deserialization {
                port: self.raw.port_id.clone(),
                source,
            })
    }
}
