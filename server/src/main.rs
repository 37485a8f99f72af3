use clap::Parser;
use log::{error, info};
use server::config::{BroadcastPolicy, ServerConfig};
use server::network::Server;
use shared::World;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second, 1-240)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// World width in pixels
    #[clap(long, default_value_t = shared::WORLD_WIDTH)]
    width: f32,
    /// World height in pixels
    #[clap(long, default_value_t = shared::WORLD_HEIGHT)]
    height: f32,
    /// Movement speed in pixels per second
    #[clap(long, default_value_t = shared::PARTICIPANT_SPEED)]
    speed: f32,
    /// Which participants go into each movement snapshot
    #[clap(long, value_enum, default_value_t = BroadcastPolicy::OnChange)]
    policy: BroadcastPolicy,
    /// Ticks between statistics lines
    #[clap(long, default_value = "60")]
    stats_interval: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            world: World {
                width: args.width,
                height: args.height,
                speed: args.speed,
                ..World::default()
            },
            tick_rate: args.tick_rate,
            policy: args.policy,
            stats_interval: args.stats_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let config = ServerConfig::from(Args::parse());
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
