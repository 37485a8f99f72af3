//! # Replication Client Library
//!
//! This library provides the client side of the position replication system.
//! A client connects over WebSocket, mirrors every participant the server
//! announces, predicts their motion between snapshots and feeds its own
//! movement intents back to the server.
//!
//! ## Architecture Overview
//!
//! ### Mirror and Prediction
//! The server is the only authority on positions. The client keeps a local
//! copy of the world that server frames overwrite. Between frames every
//! mirrored participant is advanced with the same integrator the server runs,
//! so a snapshot usually lands where the prediction already was.
//!
//! ### Frame Verification
//! Every inbound message is checked for kind, direction and exact length
//! before it touches the mirror. A malformed frame ends the connection.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - The participant mirror keyed by id
//! - Hello, join, leave and batch application
//! - Local prediction
//!
//! ### Input Module (`input`)
//! - Edge-triggered direction bits
//! - A goal-seeking bot that drives the same bits
//!
//! ### Probe Module (`probe`)
//! Periodic Ping frames and round-trip measurement from the echoed Pong.
//!
//! ### Network Module (`network`)
//! The WebSocket loop: reads server frames and runs local frames at a fixed
//! rate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ClientConfig {
//!         server: "ws://127.0.0.1:8080".to_string(),
//!         ..ClientConfig::default()
//!     };
//!
//!     // Runs a single bot for ten seconds at 60 fps.
//!     let mut client = Client::new(config)?;
//!     client.run(Some(600)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod probe;
