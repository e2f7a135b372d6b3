use std::sync::Arc;

use clap::Parser;
use publish_bench::config::{Args, BenchConfig, BrokerKind};
use publish_bench::{AmqpBroker, Broker, BenchmarkRunner, MemoryBroker};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so the report on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "publish_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Missing required options exit here with usage
    let args = Args::parse();
    let config = BenchConfig::from_args(args)?;
    info!(
        "Loaded configuration: broker={}, queue={}, tasks={}, iterations={}, mb={}",
        config.broker.name(),
        config.queue,
        config.workers,
        config.iterations,
        config.payload_mb
    );

    let broker: Arc<dyn Broker> = match config.broker {
        BrokerKind::Amqp => Arc::new(AmqpBroker::new(config.uri.clone())),
        BrokerKind::Memory => Arc::new(MemoryBroker::new()),
    };

    let emit_json = config.json;
    // The runner rejects unsupported options before touching the broker
    let runner = BenchmarkRunner::new(config, broker);

    let summary = runner.run().await?;
    if emit_json {
        println!("{}", summary.to_json()?);
    }

    Ok(())
}
