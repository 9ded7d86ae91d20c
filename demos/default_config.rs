use traffic_sync::{NodeConfig, Result};

/// Prints a node configuration with every default filled in, ready to be
/// edited and passed to the `udp_node` demo.
fn main() -> Result<()> {
    let config = NodeConfig::default();
    config.protocol.validate()?;

    println!("{}", config.to_json()?);
    eprintln!("Identity {} was generated randomly.", config.identity);
    eprintln!(
        "Heartbeat every {:?}, peer declared lost after {:?}.",
        config.protocol.heartbeat_interval, config.protocol.heartbeat_timeout
    );
    eprintln!(
        "GO lasts between {:?} and {:?}.",
        config.protocol.go_min, config.protocol.go_max
    );
    Ok(())
}
