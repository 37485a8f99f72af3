//! Frame encoding and fan-out to registry members.
//!
//! Each frame is encoded once and the bytes are cloned per recipient. Sends
//! are fire-and-forget: a closed outbound channel only means the connection
//! task is already on its way out and will run the leave path itself.

use crate::registry::{Participant, Registry};
use log::{error, trace};
use shared::protocol::MAX_BATCH_RECORDS;
use shared::{Frame, ParticipantState};

/// Traffic counters for one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Traffic {
    pub frames: u64,
    pub bytes: u64,
    /// Sends to a connection whose outbound channel was already closed.
    pub dropped: u64,
}

impl Traffic {
    pub fn absorb(&mut self, other: Traffic) {
        self.frames += other.frames;
        self.bytes += other.bytes;
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Default)]
pub struct Broadcaster {
    traffic: Traffic,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traffic(&self) -> Traffic {
        self.traffic
    }

    /// Returns the counters gathered so far and starts a fresh window.
    pub fn take_traffic(&mut self) -> Traffic {
        std::mem::take(&mut self.traffic)
    }

    fn encode(frame: &Frame) -> Option<Vec<u8>> {
        match frame.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Failed to encode {:?} frame: {}", frame.kind(), e);
                None
            }
        }
    }

    fn deliver(&mut self, to: &Participant, bytes: Vec<u8>) {
        let len = bytes.len() as u64;
        if to.outbox().send(bytes).is_ok() {
            self.traffic.frames += 1;
            self.traffic.bytes += len;
        } else {
            trace!("Outbound channel for participant {} is closed", to.id);
            self.traffic.dropped += 1;
        }
    }

    /// Sends one frame to a single participant.
    pub fn send(&mut self, to: &Participant, frame: &Frame) {
        if let Some(bytes) = Self::encode(frame) {
            self.deliver(to, bytes);
        }
    }

    /// Sends one frame to every live participant whose id `include` accepts.
    pub fn broadcast_where<F>(&mut self, registry: &Registry, frame: &Frame, include: F)
    where
        F: Fn(u32) -> bool,
    {
        let Some(bytes) = Self::encode(frame) else {
            return;
        };

        for participant in registry.iter() {
            if include(participant.id) {
                self.deliver(participant, bytes.clone());
            }
        }
    }

    /// Sends one frame to every live participant except `exclude`.
    pub fn broadcast(&mut self, registry: &Registry, frame: &Frame, exclude: Option<u32>) {
        self.broadcast_where(registry, frame, |id| Some(id) != exclude);
    }

    /// Sends `records` to every live participant as batch snapshots, split
    /// into as many frames as the u16 count field requires.
    pub fn broadcast_snapshot(&mut self, registry: &Registry, records: &[ParticipantState]) {
        for chunk in records.chunks(MAX_BATCH_RECORDS) {
            self.broadcast(registry, &Frame::Batch(chunk.to_vec()), None);
        }
    }
}
