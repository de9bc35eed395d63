use std::{error::Error, net::SocketAddr, sync::Arc};

use berth::protocol::{
    BasicDispatcher, DEFAULT_MAX_CLIENTS, DEFAULT_WORKERS, Server, ServerConfig,
};
use clap::Parser;
use log::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connection at address
    address: SocketAddr,
    /// Maximum number of concurrently connected clients
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,
    /// Worker threads shared by all connections
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = ServerConfig {
        address: cli.address,
        max_clients: cli.max_clients,
        workers: cli.workers,
    };
    let server = Server::bind(config, Arc::new(BasicDispatcher::new()))?;

    let handle = server.handle();
    ctrlc::set_handler(move || {
        info!("interrupt received");
        handle.stop();
    })?;

    server.run();
    Ok(())
}
