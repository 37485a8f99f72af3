//! # Replication Server Library
//!
//! This library provides the authoritative server for the position replication
//! system. It owns every participant's position, accepts movement intents from
//! connected clients, and on a fixed tick publishes joins, leaves and movement
//! snapshots so that every client can mirror the shared world.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Positions only ever change inside the tick, when the server integrates each
//! participant's last received movement mask over the elapsed wall-clock time.
//! Clients predict locally with the same integrator and are overwritten by the
//! next snapshot.
//!
//! ### Membership
//! Connections join and leave at arbitrary times. Both events are recorded
//! immediately in a diff set but only announced at the next tick boundary, so
//! every client sees membership change in the same well-defined order.
//! A connection that joins and leaves inside one interval is never announced.
//!
//! ### Broadcasting
//! Each cycle sends, in order: the private Hello and catch-up roster for every
//! newcomer, join announcements, leave announcements, and one movement batch.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! - Participant id assignment, spawn position and hue
//! - Movement intent storage written concurrently by connection tasks
//! - The per-tick diff set with join/leave self-cancellation
//!
//! ### Broadcast Module (`broadcast`)
//! Encodes a frame once and fans it out to the selected connections, counting
//! frames, bytes and sends to connections that have already gone.
//!
//! ### Scheduler Module (`scheduler`)
//! The seven-step tick cycle and its statistics.
//!
//! ### Network Module (`network`)
//! - WebSocket listener and per-connection tasks
//! - Frame verification and Ping/Pong echo
//! - The fixed-rate tick loop
//!
//! ### Config Module (`config`)
//! Startup parameters: bind address, tick rate, world dimensions and the
//! broadcast policy.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         tick_rate: 30,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binds the listener, then runs the accept loop and the tick loop
//!     // until the future is dropped.
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod network;
pub mod registry;
pub mod scheduler;
