use crate::core::{Configuration, Context, Source};
use crate::error::NodeError;
use crate::io::codec::u64_to_bytes;
use crate::io::{Output, Outputs};
use crate::registry::{NodeConstructor, NodeDeclaration, NodeRegistration};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub const OUTPUT: &str = "out";

/// Emits `start`, `start + step`, ... on `out`, one value per tick.
pub struct CounterSource {
    output: Output<u64>,
    value: u64,
    step: u64,
    interval: Duration,
    remaining: Option<u64>,
}

impl CounterSource {
    pub fn new(_ctx: &mut Context, config: &Configuration, mut outputs: Outputs) -> Result<Self> {
        Ok(Self {
            output: outputs.take(OUTPUT, u64_to_bytes)?,
            value: config["start"].as_u64().unwrap_or(0),
            step: config["step"].as_u64().unwrap_or(1),
            interval: Duration::from_millis(config["interval_ms"].as_u64().unwrap_or(100)),
            remaining: config["limit"].as_u64(),
        })
    }
}

#[async_trait]
impl Source for CounterSource {
    async fn iteration(&mut self) -> Result<()> {
        if self.remaining == Some(0) {
            return Err(NodeError::Exhausted.into());
        }

        tokio::time::sleep(self.interval).await;
        self.output.send(&self.value, None).await?;
        self.value = self.value.wrapping_add(self.step);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(())
    }
}

fn build(ctx: &mut Context, config: &Configuration, outputs: Outputs) -> Result<Box<dyn Source>> {
    Ok(Box::new(CounterSource::new(ctx, config, outputs)?))
}

pub fn register() -> NodeDeclaration {
    NodeDeclaration::new("counter_source", NodeConstructor::Source(build))
        .with_description("Emits an increasing integer at a fixed interval")
        .add_output(OUTPUT, "u64")
        .add_parameter("start", "number", json!(0))
        .add_parameter("step", "number", json!(1))
        .add_parameter("interval_ms", "number", json!(100))
        .add_parameter("limit", "number", json!(null))
}

inventory::submit! {
    NodeRegistration(register)
}
