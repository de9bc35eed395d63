use std::{
    error::Error,
    io::{self, BufReader},
};

use berth::{
    AuthAsker, CommandAsker, Console,
    output::StdOut,
    protocol::{Client, ClientConfig},
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    host: String,
    /// Server port
    port: u16,
    /// Pause between reconnection attempts, in milliseconds
    #[arg(long, default_value_t = 5000, allow_negative_numbers = true)]
    reconnection_timeout: i64,
    /// Reconnection attempts before giving up
    #[arg(long, default_value_t = 3)]
    max_reconnection_attempts: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = ClientConfig {
        host: cli.host,
        port: cli.port,
        reconnection_timeout_ms: cli.reconnection_timeout,
        max_reconnection_attempts: cli.max_reconnection_attempts,
    };

    // Both askers share stdin; unit capacity keeps either from buffering
    // lines meant for the other.
    let auth = AuthAsker::new(
        BufReader::with_capacity(1, io::stdin()),
        StdOut::new(io::stdout()),
    );
    let commands = CommandAsker::new(
        BufReader::with_capacity(1, io::stdin()),
        StdOut::new(io::stdout()),
    );

    let mut client = Client::new(config, auth, commands, Console);
    client.run();
    Ok(())
}
