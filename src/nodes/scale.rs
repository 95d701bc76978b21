use crate::core::{Configuration, Context, Message, Operator};
use crate::io::codec::{u64_from_bytes, u64_to_bytes};
use crate::io::{Input, Inputs, Output, Outputs};
use crate::registry::{NodeConstructor, NodeDeclaration, NodeRegistration};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub const INPUT: &str = "in";
pub const OUTPUT: &str = "out";

/// Multiplies every integer it receives by `factor`. Watermarks pass through.
pub struct Scale {
    input: Input<u64>,
    output: Output<u64>,
    factor: u64,
}

impl Scale {
    pub fn new(
        _ctx: &mut Context,
        config: &Configuration,
        mut inputs: Inputs,
        mut outputs: Outputs,
    ) -> Result<Self> {
        Ok(Self {
            input: inputs.take(INPUT, u64_from_bytes)?,
            output: outputs.take(OUTPUT, u64_to_bytes)?,
            factor: config["factor"].as_u64().unwrap_or(2),
        })
    }
}

#[async_trait]
impl Operator for Scale {
    async fn iteration(&mut self) -> Result<()> {
        match self.input.recv().await? {
            Message::Data(msg) => {
                let scaled = msg.payload().saturating_mul(self.factor);
                self.output.send_from(&scaled, &msg).await?;
            }
            Message::Watermark(_) => {
                self.output.raw().send_watermark().await?;
            }
        }
        Ok(())
    }
}

fn build(
    ctx: &mut Context,
    config: &Configuration,
    inputs: Inputs,
    outputs: Outputs,
) -> Result<Box<dyn Operator>> {
    Ok(Box::new(Scale::new(ctx, config, inputs, outputs)?))
}

pub fn register() -> NodeDeclaration {
    NodeDeclaration::new("scale", NodeConstructor::Operator(build))
        .with_description("Multiplies integers by a constant factor")
        .add_input(INPUT, "u64")
        .add_output(OUTPUT, "u64")
        .add_parameter("factor", "number", json!(2))
}

inventory::submit! {
    NodeRegistration(register)
}
