use nodeflow::core::{E2EDeadline, FromDescriptor, ToDescriptor};
use nodeflow::engine::{FlowBuilder, RuntimeConfig};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nodeflow=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RuntimeConfig::from_json(&json!({
        "runtime_config": {
            "runtime_name": "demo",
            "channel_capacity": 10
        }
    }))?;

    // counter -> scale -> log
    let mut builder = FlowBuilder::new("counter-demo", config);
    builder
        .add_node("counter", "counter_source", json!({ "start": 1, "interval_ms": 50, "limit": 10 }))?
        .add_node("double", "scale", json!({ "factor": 2 }))?
        .add_node("console", "log_sink", json!({ "label": "Doubled" }))?
        .connect("counter", "out", "double", "in")?
        .connect("double", "out", "console", "in")?
        .add_e2e_deadline(E2EDeadline::new(
            FromDescriptor::new("counter", "out"),
            ToDescriptor::new("console", "in"),
            Duration::from_millis(5),
        ))?
        .local_deadline("double", Duration::from_millis(1))?;

    let mut flow = builder.build();
    flow.start().await?;
    tracing::info!("Flow {} started", flow.name());

    flow.wait().await?;
    tracing::info!("Flow finished in state {}", flow.state().name());
    println!("{}", flow.monitor().generate_report());

    Ok(())
}
