use crate::game::ClientWorld;
use crate::input::{GoalSeeker, DEFAULT_EPSILON};
use crate::probe::{LatencyProbe, DEFAULT_PING_EVERY};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace};
use shared::{Frame, ProtocolError, World, WorldError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server: String,
    /// Must match the server's world for prediction to agree.
    pub world: World,
    pub fps: u32,
    pub ping_every: u32,
    pub epsilon: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "ws://127.0.0.1:8080".to_string(),
            world: World::default(),
            fps: 60,
            ping_every: DEFAULT_PING_EVERY,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("frame rate must be at least 1")]
    FrameRate,

    #[error(transparent)]
    World(#[from] WorldError),
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::FrameRate);
        }
        self.world.validate()?;
        Ok(())
    }
}

/// One bot connection: mirror, intent source and latency probe.
pub struct Client {
    config: ClientConfig,
    mirror: ClientWorld,
    bot: GoalSeeker,
    probe: LatencyProbe,
    frames_received: u64,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bot = GoalSeeker::new(config.world, config.epsilon);
        Ok(Self::with_bot(config, bot))
    }

    pub fn with_bot(config: ClientConfig, bot: GoalSeeker) -> Self {
        Client {
            mirror: ClientWorld::new(config.world),
            probe: LatencyProbe::new(config.ping_every),
            bot,
            frames_received: 0,
            config,
        }
    }

    pub fn mirror(&self) -> &ClientWorld {
        &self.mirror
    }

    pub fn probe(&self) -> &LatencyProbe {
        &self.probe
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Verifies and applies one binary message from the server.
    pub fn handle_message(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let frame = Frame::decode_client_bound(bytes)?;
        self.frames_received += 1;

        if let Frame::Pong { timestamp } = frame {
            let rtt = self.probe.on_pong(timestamp);
            debug!("Ping: {} ms", rtt);
        } else {
            self.mirror.apply(&frame);
        }
        Ok(())
    }

    /// Runs one local frame and returns the frames to send.
    ///
    /// Nothing is produced before the server's Hello has arrived.
    pub fn on_frame(&mut self, dt: f32) -> Vec<Frame> {
        self.mirror.predict(dt);

        let Some(position) = self.mirror.own().map(|own| own.position()) else {
            return Vec::new();
        };

        let mut outgoing = Vec::new();
        if let Some(mask) = self.bot.update(position) {
            self.mirror.set_own_mask(mask);
            outgoing.push(Frame::MovementIntent { mask });
        }
        if let Some(ping) = self.probe.on_frame() {
            outgoing.push(ping);
        }
        outgoing
    }

    /// Connects and runs until the server closes the connection, a frame fails
    /// verification, or `frame_limit` local frames have elapsed.
    pub async fn run(&mut self, frame_limit: Option<u64>) -> ClientResult<()> {
        info!("Connecting to {}", self.config.server);
        let (ws_stream, _) = connect_async(self.config.server.as_str()).await?;
        let (mut sink, mut source) = ws_stream.split();
        info!("Connected to {}", self.config.server);

        let frame_duration = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        let mut frame_interval = interval(frame_duration);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();
        let mut frames: u64 = 0;

        loop {
            tokio::select! {
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Err(e) = self.handle_message(&bytes) {
                                error!("Dropping connection after malformed frame: {}", e);
                                let _ = sink.close().await;
                                return Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            return Ok(());
                        }
                        Some(Ok(Message::Text(_))) => {
                            let _ = sink.close().await;
                            return Err("server sent a text message".into());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;

                    for frame in self.on_frame(dt) {
                        trace!("Sending {:?}", frame.kind());
                        sink.send(Message::Binary(frame.encode()?)).await?;
                    }

                    frames += 1;
                    if frame_limit.is_some_and(|limit| frames >= limit) {
                        info!(
                            "Frame limit reached, {} participants mirrored, average ping {:?} ms",
                            self.mirror.len(),
                            self.probe.average_rtt()
                        );
                        sink.close().await?;
                        return Ok(());
                    }
                },
            }
        }
    }
}
