use crate::error::NodeError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

fn missing(node: &str, method: &'static str) -> anyhow::Error {
    NodeError::MissingMethod {
        node: node.to_string(),
        method,
    }
    .into()
}

/// Node that only produces data.
///
/// Built from `(Context, Configuration, Outputs)`. The runner calls
/// `iteration` in a loop until cancelled or an output is gone, then
/// `finalize` once.
#[async_trait]
pub trait Source: Send {
    async fn iteration(&mut self) -> Result<()> {
        Err(missing(std::any::type_name::<Self>(), "iteration"))
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Node with both inputs and outputs.
#[async_trait]
pub trait Operator: Send {
    async fn iteration(&mut self) -> Result<()> {
        Err(missing(std::any::type_name::<Self>(), "iteration"))
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Node that only consumes data.
#[async_trait]
pub trait Sink: Send {
    async fn iteration(&mut self) -> Result<()> {
        Err(missing(std::any::type_name::<Self>(), "iteration"))
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Source,
    Operator,
    Sink,
}

impl NodeKind {
    pub fn has_inputs(&self) -> bool {
        matches!(self, Self::Operator | Self::Sink)
    }

    pub fn has_outputs(&self) -> bool {
        matches!(self, Self::Source | Self::Operator)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Operator => "operator",
            Self::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// A constructed node, ready to be handed to a runner.
pub enum NodeInstance {
    Source(Box<dyn Source>),
    Operator(Box<dyn Operator>),
    Sink(Box<dyn Sink>),
}

impl NodeInstance {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Source(_) => NodeKind::Source,
            Self::Operator(_) => NodeKind::Operator,
            Self::Sink(_) => NodeKind::Sink,
        }
    }

    pub fn has_inputs(&self) -> bool {
        self.kind().has_inputs()
    }

    pub fn has_outputs(&self) -> bool {
        self.kind().has_outputs()
    }

    pub async fn iteration(&mut self) -> Result<()> {
        match self {
            Self::Source(node) => node.iteration().await,
            Self::Operator(node) => node.iteration().await,
            Self::Sink(node) => node.iteration().await,
        }
    }

    pub async fn finalize(&mut self) -> Result<()> {
        match self {
            Self::Source(node) => node.finalize().await,
            Self::Operator(node) => node.finalize().await,
            Self::Sink(node) => node.finalize().await,
        }
    }
}

impl fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeInstance::{}", self.kind())
    }
}
