use clap::Parser;
use log::info;
use server::network::Server;
use server::relay::RelayConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Cap on concurrent sessions (unlimited when not set)
    #[arg(long)]
    max_clients: Option<usize>,

    /// Frames buffered per session before new ones are dropped
    #[arg(long, default_value = "256")]
    send_queue: usize,

    /// Per-frame write timeout in milliseconds
    #[arg(long, default_value = "5000")]
    send_timeout_ms: u64,

    /// Inbound events buffered for the dispatch loop
    #[arg(long, default_value = "1024")]
    event_queue: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = RelayConfig {
        max_clients: args.max_clients,
        send_queue: args.send_queue.max(1),
        send_timeout: Duration::from_millis(args.send_timeout_ms),
        event_queue: args.event_queue.max(1),
        ..RelayConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
