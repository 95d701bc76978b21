pub mod context;
pub mod deadline;
pub mod message;
pub mod node;
pub mod timestamp;
pub mod token;

use std::sync::Arc;

/// Identifier of an input or output port, unique within a node.
pub type PortId = Arc<str>;
/// Identifier of a node, unique within a flow.
pub type NodeId = Arc<str>;
/// Free-form node configuration.
pub type Configuration = serde_json::Value;

pub use context::{Context, InputCallback, OutputCallback};
pub use deadline::{
    E2EDeadline, E2EDeadlineMiss, E2EDeadlineStart, FromDescriptor, LocalDeadlineMiss,
    ToDescriptor,
};
pub use message::{DataMessage, Message, NodeOutput, Payload};
pub use node::{NodeInstance, NodeKind, Operator, Sink, Source};
pub use timestamp::{HybridClock, Timestamp};
pub use token::{InputToken, TokenAction, TokenStatus, Tokens};
