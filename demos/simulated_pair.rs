use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use traffic_sync::{
    MemoryLink, Node, NodeIdentity, ProtocolConfig, ProtocolDriver, Result, TracingLights,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,traffic_sync=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let a = NodeIdentity::random();
    let b = NodeIdentity::random();
    let ((link_a, rx_a), (link_b, rx_b)) = MemoryLink::pair(a, b);
    let switch_a = link_a.drop_switch();
    let switch_b = link_b.drop_switch();

    // Short cycle so a few handoffs fit in the demo.
    let config = ProtocolConfig {
        go_min: Duration::from_secs(2),
        go_max: Duration::from_secs(4),
        ..Default::default()
    };

    let driver_a = ProtocolDriver::new(a, config.clone())?;
    let driver_b = ProtocolDriver::new(b, config)?;
    let node_a = Node::new(driver_a, link_a, rx_a, TracingLights::new("A"))?;
    let node_b = Node::new(driver_b, link_b, rx_b, TracingLights::new("B"))?;
    let status_a = node_a.subscribe();
    let status_b = node_b.subscribe();

    tokio::spawn(node_a.run());
    tokio::spawn(node_b.run());

    println!("Running pair {a} / {b} for 20s");
    sleep(Duration::from_secs(20)).await;

    println!("Radio silenced");
    switch_a.set_drop(true);
    switch_b.set_drop(true);
    sleep(Duration::from_secs(5)).await;

    println!("Radio restored");
    switch_a.set_drop(false);
    switch_b.set_drop(false);
    sleep(Duration::from_secs(15)).await;

    let info_a = status_a.borrow().clone();
    let info_b = status_b.borrow().clone();
    println!("A: {info_a:?}");
    println!("B: {info_b:?}");
    Ok(())
}
