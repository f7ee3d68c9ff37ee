//! mdstream-connector: Market data streaming binary
//!
//! Starts one trades and one bids/asks session per configured broker and
//! hands new records to the configured sink.

mod keepalive;
mod sink;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use mdstream_connector_lib::{
    ConnectionRegistry, DataBroker, EngineContext, InMemoryVenue, KrakenVenue, ServerState,
};
use mdstream_metadata::{EngineConfig, SinkType, MEMORY_VENUE};
use mdstream_middleware::{ChannelConsumer, Consumer, DiscardConsumer, LogConsumer};

use crate::keepalive::keep_alive;
use crate::sink::{run_sink, JsonlSink};

const SINK_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "mdstream-connector")]
#[command(about = "Streams new trades and best bid/ask quotes from many venues")]
struct Args {
    /// Path to engine configuration file
    #[arg(short, long, env = "MDSTREAM_CONFIG")]
    config: PathBuf,

    /// Health server bind address
    #[arg(long, env = "MDSTREAM_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    health_addr: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = EngineConfig::load(&args.config)?;
    info!(
        name = %config.name,
        brokers = config.brokers.len(),
        market_type = %config.market_type,
        "Loaded engine configuration"
    );

    let health_addr: SocketAddr = args.health_addr.parse()?;

    let memory_venue = InMemoryVenue::new().with_markets(&config.market_type, config.memory_markets());
    let registry = ConnectionRegistry::new(config.broker_mapping())
        .with_factory(MEMORY_VENUE, Arc::new(memory_venue))
        .with_factory("kraken", Arc::new(KrakenVenue::new()));

    let mut sink_task = None;
    let consumer: Arc<dyn Consumer> = match config.sink.sink_type {
        SinkType::Log => Arc::new(LogConsumer),
        SinkType::None => Arc::new(DiscardConsumer),
        SinkType::Jsonl => {
            let path = config
                .sink
                .path
                .clone()
                .ok_or("jsonl sink requires a path")?;
            let (consumer, rx) = ChannelConsumer::new(SINK_CHANNEL_CAPACITY);
            info!(path = %path.display(), "Writing batches to JSONL");
            sink_task = Some(tokio::spawn(run_sink(JsonlSink::new(path), rx)));
            Arc::new(consumer)
        }
    };

    let ctx = EngineContext::from_config(&config, Arc::new(registry), consumer);
    let broker = DataBroker::new(ctx);

    for broker_config in &config.brokers {
        for pipeline in &broker_config.pipelines {
            // Start failures are logged by the broker
            drop(broker.watch(&broker_config.name, *pipeline));
        }
    }

    let server_state = ServerState::new(&config.name, broker.running_handle());
    tokio::spawn(async move {
        if let Err(e) = mdstream_connector_lib::run_server(health_addr, server_state).await {
            error!(error = %e, "Health server error");
        }
    });
    info!(addr = %health_addr, "Health server started");

    let stop = Arc::new(AtomicBool::new(false));
    let keep_alive_task = tokio::spawn(keep_alive(Arc::clone(&stop), broker.running_handle()));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    stop.store(true, Ordering::SeqCst);

    broker.shutdown().await;
    drop(broker);
    if let Some(task) = sink_task {
        if let Err(e) = task.await {
            error!(error = %e, "JSONL sink task failed");
        }
    }
    if let Err(e) = keep_alive_task.await {
        error!(error = %e, "Keep-alive task failed");
    }

    info!("mdstream-connector stopped");
    Ok(())
}
