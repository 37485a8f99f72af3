use clap::Parser;
use client::network::{Client, ClientConfig};
use log::{error, info};
use shared::World;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Number of bot connections to run
    #[arg(short = 'b', long, default_value = "1")]
    bots: usize,

    /// Local frames per second
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Frames between latency probes
    #[arg(long, default_value = "30")]
    ping_every: u32,

    /// Distance at which the bot considers an axis reached
    #[arg(long, default_value = "4.0")]
    epsilon: f32,

    /// World width, must match the server
    #[arg(short = 'w', long, default_value_t = shared::WORLD_WIDTH)]
    width: f32,

    /// World height (no short flag to avoid conflict with --help)
    #[arg(long, default_value_t = shared::WORLD_HEIGHT)]
    height: f32,

    /// Movement speed, must match the server
    #[arg(long, default_value_t = shared::PARTICIPANT_SPEED)]
    speed: f32,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        server: args.server,
        world: World {
            width: args.width,
            height: args.height,
            speed: args.speed,
            ..World::default()
        },
        fps: args.fps,
        ping_every: args.ping_every,
        epsilon: args.epsilon,
    };

    config.validate()?;
    info!("Starting {} bot(s) against {}", args.bots, config.server);

    let mut handles = Vec::with_capacity(args.bots);
    for bot in 0..args.bots.max(1) {
        let config = config.clone();
        let frame_limit = args.frames;
        handles.push(tokio::spawn(async move {
            let mut client = match Client::new(config) {
                Ok(client) => client,
                Err(e) => {
                    error!("Bot {} could not start: {}", bot, e);
                    return;
                }
            };
            if let Err(e) = client.run(frame_limit).await {
                error!("Bot {} stopped: {}", bot, e);
            }
        }));
    }

    tokio::select! {
        _ = futures_util::future::join_all(handles) => {
            info!("All bots finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
