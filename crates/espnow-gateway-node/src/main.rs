//! ESP-NOW Gateway Node - receives sensor frames and publishes them
//!
//! This binary runs the gateway service with:
//! - A UDP link receiving `MAC ‖ envelope` datagrams from an ESP-NOW receiver
//! - A broker client writing `topic payload` lines to stdout
//! - Diagnostic records emitted through tracing

mod stdout_broker;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use espnow_gateway::{
    GatewayConfig, GatewayService, IngressDispatcher, LinkConfig, ServiceStats, TopicMap,
    TracingSink, UdpLink,
};
use stdout_broker::StdoutBroker;

#[derive(Parser)]
#[command(name = "espnow-gateway-node")]
#[command(about = "ESP-NOW to MQTT gateway publishing on the Domoticz topic tree")]
struct Args {
    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// UDP address to receive forwarded frames on (overrides the config file)
    #[arg(long, short)]
    bind: Option<SocketAddr>,

    /// Publish with the retain flag set
    #[arg(long)]
    retain: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            GatewayConfig::from_json_file(path)?
        }
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.link = LinkConfig::Udp { bind };
    }
    if args.retain {
        config.broker.retain = true;
    }
    config.validate()?;

    let LinkConfig::Udp { bind } = config.link;

    info!("Starting ESP-NOW gateway {}", espnow_gateway::VERSION);
    for (category, topic) in TopicMap::entries() {
        info!("  {:<12} ({}) -> {}", category.name(), category.tag(), topic);
    }

    let broker = StdoutBroker::stdout(&config.broker);
    info!(
        client_id = broker.client_id(),
        last_will = %config.broker.last_will_topic,
        retain = config.broker.retain,
        "Broker client ready"
    );

    let dispatcher = Arc::new(IngressDispatcher::from_config(
        &config,
        Arc::new(broker),
        Arc::new(TracingSink),
    ));

    let link = UdpLink::new(bind);
    let (service, handle) = GatewayService::new(link, dispatcher, &config.service);
    let mut task = tokio::spawn(service.run());

    info!("═══════════════════════════════════════════════════════════");
    info!("  Listening for ESP-NOW frames on udp://{}", bind);
    info!("  Press Ctrl-C to stop");
    info!("═══════════════════════════════════════════════════════════");

    let result = tokio::select! {
        result = &mut task => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received, shutting down");
            if let Err(e) = handle.shutdown().await {
                error!("Failed to request shutdown: {}", e);
            }
            task.await
        }
    };

    match result? {
        Ok(stats) => {
            log_final_stats(&stats);
            Ok(())
        }
        Err(e) => {
            error!(code = e.error_code(), "Gateway stopped: {}", e);
            Err(e.into())
        }
    }
}

fn log_final_stats(stats: &ServiceStats) {
    info!(
        received = stats.dispatch.frames_received,
        published = stats.dispatch.published,
        rejected = stats.dispatch.decode_failures,
        unrouted = stats.dispatch.unrouted,
        publish_failures = stats.dispatch.publish_failures,
        link_errors = stats.link_errors,
        "Final gateway stats"
    );
}
