use std::env;

use tracing_subscriber::EnvFilter;
use traffic_sync::{Node, NodeConfig, ProtocolDriver, Result, TracingLights, UdpLink};

/// Runs one node over UDP broadcast.
///
/// Usage: `udp_node [config.json]`. Without a file the defaults are used
/// with a random identity; `default_config` prints them.
#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match env::args().nth(1) {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    let driver = ProtocolDriver::new(config.identity, config.protocol.clone())?;
    let (link, frames) = UdpLink::bind(config.identity, &config.link).await?;
    let lights = TracingLights::new(config.identity.to_string());
    let node = Node::new(driver, link, frames, lights)?;

    let mut status = node.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let info = status.borrow_and_update().clone();
            tracing::info!(
                state = info.state_type,
                role = ?info.role,
                light = ?info.light,
                handoffs = info.handoffs,
                "Status"
            );
        }
    });

    node.run().await
}
