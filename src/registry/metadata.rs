use crate::core::{Configuration, Context, NodeInstance, NodeKind, Operator, Sink, Source};
use crate::io::{Inputs, Outputs};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Metadata describing a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMetadata {
    pub id: String,
    pub data_type: String,
}

/// Schema for a configurable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: serde_json::Value,
}

pub type SourceConstructor = fn(&mut Context, &Configuration, Outputs) -> Result<Box<dyn Source>>;
pub type OperatorConstructor =
    fn(&mut Context, &Configuration, Inputs, Outputs) -> Result<Box<dyn Operator>>;
pub type SinkConstructor = fn(&mut Context, &Configuration, Inputs) -> Result<Box<dyn Sink>>;

/// How to build a node; the variant fixes its kind.
#[derive(Clone, Copy)]
pub enum NodeConstructor {
    Source(SourceConstructor),
    Operator(OperatorConstructor),
    Sink(SinkConstructor),
}

impl NodeConstructor {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Source(_) => NodeKind::Source,
            Self::Operator(_) => NodeKind::Operator,
            Self::Sink(_) => NodeKind::Sink,
        }
    }

    /// Build the node. Ports the kind does not use are dropped, which closes their links.
    pub fn construct(
        &self,
        ctx: &mut Context,
        config: &Configuration,
        inputs: Inputs,
        outputs: Outputs,
    ) -> Result<NodeInstance> {
        Ok(match self {
            Self::Source(build) => NodeInstance::Source(build(ctx, config, outputs)?),
            Self::Operator(build) => NodeInstance::Operator(build(ctx, config, inputs, outputs)?),
            Self::Sink(build) => NodeInstance::Sink(build(ctx, config, inputs)?),
        })
    }
}

/// Everything the runtime needs to know about one node type.
#[derive(Clone)]
pub struct NodeDeclaration {
    pub id: String,
    pub description: String,
    pub inputs: Vec<PortMetadata>,
    pub outputs: Vec<PortMetadata>,
    pub parameters: Vec<ParameterSchema>,
    pub constructor: NodeConstructor,
}

impl NodeDeclaration {
    pub fn new(id: impl Into<String>, constructor: NodeConstructor) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            constructor,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.constructor.kind()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_input(mut self, id: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.inputs.push(PortMetadata {
            id: id.into(),
            data_type: data_type.into(),
        });
        self
    }

    pub fn add_output(mut self, id: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.outputs.push(PortMetadata {
            id: id.into(),
            data_type: data_type.into(),
        });
        self
    }

    pub fn add_parameter(
        mut self,
        name: impl Into<String>,
        param_type: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        self.parameters.push(ParameterSchema {
            name: name.into(),
            param_type: param_type.into(),
            default,
        });
        self
    }

    pub fn has_input(&self, port: &str) -> bool {
        self.inputs.iter().any(|p| p.id == port)
    }

    pub fn has_output(&self, port: &str) -> bool {
        self.outputs.iter().any(|p| p.id == port)
    }
}

/// Parameterless `register` function exposed by every node module.
pub type NodeRegistrationFn = fn() -> NodeDeclaration;

/// Wrapper for inventory collection
pub struct NodeRegistration(pub NodeRegistrationFn);

inventory::collect!(NodeRegistration);
