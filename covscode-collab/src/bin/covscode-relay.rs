//! Run the in-memory relay.
//!
//! Usage: `covscode-relay [bind_addr]` (default `127.0.0.1:9090`)

use covscode_collab::relay::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut config = RelayConfig::default();
    if let Some(addr) = std::env::args().nth(1) {
        config.bind_addr = addr;
    }

    log::info!("Starting covscode relay on {}...", config.bind_addr);
    let relay = RelayServer::new(config);
    if let Err(e) = relay.run().await {
        log::error!("Relay stopped: {e}");
        std::process::exit(1);
    }
}
