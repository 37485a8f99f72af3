//! Server network layer: WebSocket transport and the fixed-rate tick loop.
//!
//! Every accepted TCP stream is upgraded to a WebSocket and handled by its own
//! task. The task registers the connection, forwards outbound frames from an
//! unbounded channel into the socket sink, and decodes inbound frames until
//! the peer goes away or sends something malformed. The tick loop runs
//! alongside and drives [`TickScheduler`] under the registry write lock.

use crate::config::ServerConfig;
use crate::registry::{Outbox, Registry};
use crate::scheduler::TickScheduler;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use shared::Frame;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type SharedRegistry = Arc<RwLock<Registry>>;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Server-wide counters shared by connection tasks and the tick loop.
#[derive(Debug, Default)]
pub struct ServerCounters {
    pub accepted: AtomicU64,
    pub rejected_frames: AtomicU64,
}

impl ServerCounters {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames.load(Ordering::Relaxed)
    }
}

/// Why a connection's read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    Closed,
    Transport(String),
    Malformed(String),
}

/// Main server coordinating the WebSocket listener and the tick loop
pub struct Server {
    listener: TcpListener,
    registry: SharedRegistry,
    counters: Arc<ServerCounters>,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry: Arc::new(RwLock::new(Registry::new(config.world))),
            counters: Arc::new(ServerCounters::default()),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn counters(&self) -> Arc<ServerCounters> {
        Arc::clone(&self.counters)
    }

    /// Runs the accept loop and the tick loop until the future is dropped.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server {
            listener,
            registry,
            counters,
            config,
        } = self;

        info!(
            "Server started: {} Hz, {:?} broadcast, world {}x{}",
            config.tick_rate, config.policy, config.world.width, config.world.height
        );

        tokio::select! {
            _ = Self::accept_loop(listener, Arc::clone(&registry), Arc::clone(&counters)) => {},
            _ = Self::tick_loop(registry, counters, config) => {},
        }

        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        registry: SharedRegistry,
        counters: Arc<ServerCounters>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&registry);
                    let counters = Arc::clone(&counters);
                    tokio::spawn(async move {
                        Self::handle_connection(stream, addr, registry, counters).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: SharedRegistry,
        counters: Arc<ServerCounters>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            trace!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (sink, mut source) = ws_stream.split();

        let (outbox, outbound) = mpsc::unbounded_channel();
        let id = registry.write().await.accept(outbox.clone());
        counters.accepted.fetch_add(1, Ordering::Relaxed);
        info!("Connection from {} registered as participant {}", addr, id);

        let writer = tokio::spawn(Self::write_loop(sink, outbound));

        let reason = Self::read_loop(id, &mut source, &registry, &counters, &outbox).await;
        match &reason {
            Disconnect::Closed => info!("Participant {} closed the connection", id),
            Disconnect::Transport(e) => info!("Participant {} disconnected: {}", id, e),
            Disconnect::Malformed(e) => {
                warn!("Closing participant {} after malformed frame: {}", id, e)
            }
        }

        registry.write().await.remove(id);

        // The writer drains whatever is queued, then closes the socket once
        // the last sender is gone.
        drop(outbox);
        if let Err(e) = writer.await {
            error!("Writer task for participant {} failed: {}", id, e);
        }
    }

    async fn write_loop(mut sink: WsSink, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(bytes) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Binary(bytes)).await {
                trace!("Outbound send failed: {}", e);
                return;
            }
        }
        if let Err(e) = sink.close().await {
            trace!("Error closing WebSocket sink: {}", e);
        }
    }

    async fn read_loop(
        id: u32,
        source: &mut WsSource,
        registry: &SharedRegistry,
        counters: &ServerCounters,
        outbox: &Outbox,
    ) -> Disconnect {
        while let Some(message) = source.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => return Disconnect::Transport(e.to_string()),
            };

            let bytes = match message {
                Message::Binary(bytes) => bytes,
                Message::Close(_) => return Disconnect::Closed,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Text(_) | Message::Frame(_) => {
                    counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                    return Disconnect::Malformed("non-binary message".to_string());
                }
            };

            if let Err(e) = Self::handle_frame(id, &bytes, registry, outbox).await {
                counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                return Disconnect::Malformed(e.to_string());
            }
        }
        Disconnect::Closed
    }

    /// Applies one inbound frame.
    async fn handle_frame(
        id: u32,
        bytes: &[u8],
        registry: &SharedRegistry,
        outbox: &Outbox,
    ) -> Result<(), shared::ProtocolError> {
        match Frame::decode_server_bound(bytes)? {
            Frame::MovementIntent { mask } => {
                trace!("Participant {} intent {:#06b}", id, mask);
                registry.read().await.apply_intent(id, mask);
            }
            Frame::Ping { timestamp } => {
                let pong = Frame::Pong { timestamp }.encode()?;
                if outbox.send(pong).is_err() {
                    trace!("Pong to participant {} dropped", id);
                }
            }
            other => {
                return Err(shared::ProtocolError::UnexpectedDirection(other.kind()));
            }
        }
        Ok(())
    }

    async fn tick_loop(registry: SharedRegistry, counters: Arc<ServerCounters>, config: ServerConfig) {
        let tick_duration = config.tick_duration();
        let mut scheduler = TickScheduler::new(config.policy);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tick_interval.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick);
            last_tick = now;

            if elapsed > tick_duration * 4 {
                warn!(
                    "Tick took {:.1}ms, expected {:.1}ms",
                    elapsed.as_secs_f64() * 1000.0,
                    tick_duration.as_secs_f64() * 1000.0
                );
            }

            let (report, participants) = {
                let mut registry = registry.write().await;
                let report = scheduler.run_cycle(&mut registry, elapsed.as_secs_f32());
                (report, registry.len())
            };

            // Periodic performance monitoring
            if report.tick % config.stats_interval == 0 && participants > 0 {
                let stats = scheduler.stats();
                debug!(
                    "Tick {}: {} participants, {:.1}Hz, {} frames / {} bytes sent, {} dropped, {} accepted, {} rejected",
                    report.tick,
                    participants,
                    1.0 / elapsed.as_secs_f32().max(f32::EPSILON),
                    stats.totals.frames,
                    stats.totals.bytes,
                    stats.totals.dropped,
                    counters.accepted(),
                    counters.rejected_frames()
                );
            }
        }
    }
}
