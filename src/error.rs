use crate::core::PortId;
use thiserror::Error;

/// Errors raised by the node execution core.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Port {port} is not wired in the flow")]
    PortNotFound { port: PortId },

    #[error("Unable to deserialize message received on {port}: {source}")]
    Deserialization {
        port: PortId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unable to serialize message for {port}: {source}")]
    Serialization {
        port: PortId,
        #[source]
        source: anyhow::Error,
    },

    #[error("All upstream channels of {port} are disconnected")]
    Disconnected { port: PortId },

    #[error("Port {port} delivers through a callback")]
    CallbackMode { port: PortId },

    #[error("Port {port} has no registered callback")]
    NoCallback { port: PortId },

    #[error("Node {node} does not implement required method `{method}`")]
    MissingMethod { node: String, method: &'static str },

    #[error("A callback is already registered for port {port}")]
    CallbackAlreadyRegistered { port: PortId },

    #[error("Callbacks can only be registered before the node starts")]
    RegistrationClosed,

    #[error("Unknown node kind: {0}")]
    UnknownNode(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Node has nothing more to produce")]
    Exhausted,
}

impl NodeError {
    /// Errors that only affect the current message and let the node keep iterating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }

    /// Errors signalling that upstream is gone and the loop should wind down normally.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Exhausted)
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
