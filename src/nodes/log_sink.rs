use crate::core::{Configuration, Context, Message, Sink};
use crate::io::codec::u64_from_bytes;
use crate::io::{Input, Inputs};
use crate::registry::{NodeConstructor, NodeDeclaration, NodeRegistration};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub const INPUT: &str = "in";

/// Logs every integer it receives under `label`.
pub struct LogSink {
    input: Input<u64>,
    label: String,
    received: u64,
}

impl LogSink {
    pub fn new(_ctx: &mut Context, config: &Configuration, mut inputs: Inputs) -> Result<Self> {
        Ok(Self {
            input: inputs.take(INPUT, u64_from_bytes)?,
            label: config["label"].as_str().unwrap_or("Output").to_string(),
            received: 0,
        })
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait]
impl Sink for LogSink {
    async fn iteration(&mut self) -> Result<()> {
        match self.input.recv().await? {
            Message::Data(msg) => {
                self.received += 1;
                tracing::info!(
                    "[{}] #{} value={} @ {}",
                    self.label,
                    self.received,
                    msg.payload(),
                    msg.timestamp()
                );
                for miss in msg.missed_end_to_end_deadlines() {
                    tracing::warn!(
                        "[{}] deadline {} -> {} missed by {}ns",
                        self.label,
                        miss.from,
                        miss.to,
                        miss.end.saturating_sub(miss.start)
                    );
                }
            }
            Message::Watermark(ts) => tracing::debug!("[{}] watermark @ {}", self.label, ts),
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        tracing::info!("[{}] done, {} values received", self.label, self.received);
        Ok(())
    }
}

fn build(ctx: &mut Context, config: &Configuration, inputs: Inputs) -> Result<Box<dyn Sink>> {
    Ok(Box::new(LogSink::new(ctx, config, inputs)?))
}

pub fn register() -> NodeDeclaration {
    NodeDeclaration::new("log_sink", NodeConstructor::Sink(build))
        .with_description("Logs received integers")
        .add_input(INPUT, "u64")
        .add_parameter("label", "string", json!("Output"))
}

inventory::submit! {
    NodeRegistration(register)
}
