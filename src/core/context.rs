use super::{DataMessage, NodeId, Payload, PortId};
use crate::error::{NodeError, Result};
use crate::io::{InputRaw, OutputRaw, PollingInputs};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type InputCallback = Arc<dyn Fn(DataMessage) + Send + Sync>;
pub type OutputCallback = Arc<dyn Fn() -> Payload + Send + Sync>;

#[derive(Clone)]
pub(crate) struct InputCallbackEntry {
    pub input: Arc<InputRaw>,
}

#[derive(Clone)]
pub(crate) struct OutputCallbackEntry {
    pub output: Arc<OutputRaw>,
    pub timeout: Duration,
}

/// Identity of a node instance and the callbacks it registered while being built.
///
/// Registration is accepted until the runner seals the context, right before
/// the first iteration.
#[derive(Clone)]
pub struct Context {
    runtime_name: Arc<str>,
    runtime_uuid: Uuid,
    flow_name: Arc<str>,
    instance_uuid: Uuid,
    node_id: NodeId,
    local_deadline: Option<Duration>,
    input_callbacks: HashMap<PortId, InputCallbackEntry>,
    output_callbacks: HashMap<PortId, OutputCallbackEntry>,
    polling_inputs: Option<PollingInputs>,
    sealed: bool,
}

impl Context {
    pub fn new(
        runtime_name: impl Into<Arc<str>>,
        runtime_uuid: Uuid,
        flow_name: impl Into<Arc<str>>,
        instance_uuid: Uuid,
        node_id: impl Into<NodeId>,
    ) -> Self {
        Self {
            runtime_name: runtime_name.into(),
            runtime_uuid,
            flow_name: flow_name.into(),
            instance_uuid,
            node_id: node_id.into(),
            local_deadline: None,
            input_callbacks: HashMap::new(),
            output_callbacks: HashMap::new(),
            polling_inputs: None,
            sealed: false,
        }
    }

    /// Context for a node running outside of a flow (tests, embedding).
    pub fn for_node(node_id: impl Into<NodeId>) -> Self {
        Self::new("local", Uuid::new_v4(), "standalone", Uuid::new_v4(), node_id)
    }

    pub fn with_local_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.local_deadline = deadline;
        self
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn runtime_uuid(&self) -> Uuid {
        self.runtime_uuid
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn local_deadline(&self) -> Option<Duration> {
        self.local_deadline
    }

    /// Deliver every message of `input` to `callback` instead of `recv`.
    pub fn register_input_callback(
        &mut self,
        input: InputRaw,
        callback: impl Fn(DataMessage) + Send + Sync + 'static,
    ) -> Result<()> {
        self.ensure_open()?;
        let port = input.port_id().clone();
        if self.input_callbacks.contains_key(&port) {
            return Err(NodeError::CallbackAlreadyRegistered { port });
        }

        input.into_callback(Arc::new(callback));
        self.polling_inputs.get_or_insert_with(|| input.polling_inputs());
        self.input_callbacks.insert(
            port,
            InputCallbackEntry {
                input: Arc::new(input),
            },
        );
        Ok(())
    }

    /// Produce on `output` by calling `callback` once per `timeout` window.
    pub fn register_output_callback(
        &mut self,
        mut output: OutputRaw,
        callback: impl Fn() -> Payload + Send + Sync + 'static,
        timeout: Duration,
    ) -> Result<()> {
        self.ensure_open()?;
        let port = output.port_id().clone();
        if self.output_callbacks.contains_key(&port) {
            return Err(NodeError::CallbackAlreadyRegistered { port });
        }

        output.into_callback(Arc::new(callback));
        self.output_callbacks.insert(
            port,
            OutputCallbackEntry {
                output: Arc::new(output),
                timeout,
            },
        );
        Ok(())
    }

    pub fn input_callback_ports(&self) -> impl Iterator<Item = &PortId> {
        self.input_callbacks.keys()
    }

    /// Registered outputs and their production window.
    pub fn output_callback_ports(&self) -> impl Iterator<Item = (&PortId, Duration)> {
        self.output_callbacks.iter().map(|(port, entry)| (port, entry.timeout))
    }

    /// Whether the node still reads some input through `recv`, besides its callbacks.
    pub(crate) fn has_polling_inputs(&self) -> bool {
        self.polling_inputs
            .as_ref()
            .is_some_and(|polling| polling.count() > 0)
    }

    pub fn has_callbacks(&self) -> bool {
        !self.input_callbacks.is_empty() || !self.output_callbacks.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn input_callbacks(&self) -> impl Iterator<Item = &InputCallbackEntry> {
        self.input_callbacks.values()
    }

    pub(crate) fn output_callbacks(&self) -> impl Iterator<Item = &OutputCallbackEntry> {
        self.output_callbacks.values()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            Err(NodeError::RegistrationClosed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("runtime_name", &self.runtime_name)
            .field("runtime_uuid", &self.runtime_uuid)
            .field("flow_name", &self.flow_name)
            .field("instance_uuid", &self.instance_uuid)
            .field("node_id", &self.node_id)
            .field("input_callbacks", &self.input_callbacks.len())
            .field("output_callbacks", &self.output_callbacks.len())
            .finish()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Context(runtime_name={}, runtime_uuid={}, flow_name={}, instance_uuid={})",
            self.runtime_name, self.runtime_uuid, self.flow_name, self.instance_uuid
        )
    }
}
