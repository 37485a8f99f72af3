//! Authoritative participant registry and the per-tick diff set.
//!
//! This module owns every connected participant on the server:
//! - Identity assignment from a monotonically increasing counter
//! - Randomised spawn position and hue
//! - The outbound handle used to reach the participant's connection
//! - Join/leave bookkeeping for the next tick boundary
//!
//! Structural changes (`accept`, `remove`) need exclusive access and append to
//! the [`DiffSet`] at the moment they happen. The only state an inbound
//! connection may touch concurrently with the tick is the movement intent,
//! which is why [`Registry::apply_intent`] takes `&self` and writes atomics.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::motion::MASK_BITS;
use shared::protocol::Hello;
use shared::{ParticipantState, Position, World};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Outbound handle for one connection. Each message is one encoded frame.
pub type Outbox = mpsc::UnboundedSender<Vec<u8>>;

/// Movement intent written by the connection task and read by the tick.
///
/// Last write before the integrate step wins; at most one tick of staleness.
#[derive(Debug, Default)]
pub struct Intent {
    mask: AtomicU8,
    moved: AtomicBool,
}

impl Intent {
    pub fn mask(&self) -> u8 {
        self.mask.load(Ordering::Relaxed)
    }

    pub fn moved(&self) -> bool {
        self.moved.load(Ordering::Relaxed)
    }

    fn set(&self, mask: u8) {
        self.mask.store(mask & MASK_BITS, Ordering::Relaxed);
        self.moved.store(true, Ordering::Relaxed);
    }

    fn clear_moved(&self) {
        self.moved.store(false, Ordering::Relaxed);
    }
}

/// A live participant as seen by the server.
#[derive(Debug)]
pub struct Participant {
    pub id: u32,
    pub position: Position,
    pub hue: u8,
    pub intent: Intent,
    outbox: Outbox,
}

impl Participant {
    /// Public state as replicated to other participants.
    pub fn state(&self) -> ParticipantState {
        ParticipantState {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            hue: self.hue,
            mask: self.intent.mask(),
        }
    }

    pub fn hello(&self) -> Hello {
        Hello {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            hue: self.hue,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

/// Ids that joined or left since the last tick boundary.
///
/// Append-only between ticks; drained exactly once per cycle.
#[derive(Debug, Default)]
pub struct DiffSet {
    joined: Vec<u32>,
    left: Vec<u32>,
}

/// Result of draining a [`DiffSet`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickDiff {
    /// Surviving joins, in join order.
    pub joined: Vec<u32>,
    /// Surviving leaves, in leave order.
    pub left: Vec<u32>,
    /// Ids that joined and left inside the same interval.
    pub cancelled: Vec<u32>,
}

impl DiffSet {
    pub fn record_join(&mut self, id: u32) {
        self.joined.push(id);
    }

    pub fn record_leave(&mut self, id: u32) {
        self.left.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }

    /// Empties the set. An id present on both sides is dropped from both.
    pub fn drain(&mut self) -> TickDiff {
        let mut joined = std::mem::take(&mut self.joined);
        let mut left = std::mem::take(&mut self.left);

        let cancelled: Vec<u32> = joined
            .iter()
            .copied()
            .filter(|id| left.contains(id))
            .collect();

        if !cancelled.is_empty() {
            joined.retain(|id| !cancelled.contains(id));
            left.retain(|id| !cancelled.contains(id));
        }

        TickDiff {
            joined,
            left,
            cancelled,
        }
    }
}

/// Maps connection identity to participant state.
pub struct Registry {
    world: World,
    participants: BTreeMap<u32, Participant>,
    next_id: u32,
    diff: DiffSet,
    rng: StdRng,
}

impl Registry {
    pub fn new(world: World) -> Self {
        Self::with_rng(world, StdRng::from_entropy())
    }

    /// Registry with a deterministic spawn sequence.
    pub fn seeded(world: World, seed: u64) -> Self {
        Self::with_rng(world, StdRng::seed_from_u64(seed))
    }

    fn with_rng(world: World, rng: StdRng) -> Self {
        Self {
            world,
            participants: BTreeMap::new(),
            next_id: 0,
            diff: DiffSet::default(),
            rng,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Registers a freshly accepted connection and returns its id.
    ///
    /// The participant is invisible to everyone until the next tick boundary.
    pub fn accept(&mut self, outbox: Outbox) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let position = Position::new(
            self.rng.gen_range(0.0..self.world.width),
            self.rng.gen_range(0.0..self.world.height),
        );
        let hue: u8 = self.rng.gen();

        self.participants.insert(
            id,
            Participant {
                id,
                position,
                hue,
                intent: Intent::default(),
                outbox,
            },
        );
        self.diff.record_join(id);

        info!(
            "Participant {} joined at ({:.1}, {:.1}) hue {}",
            id, position.x, position.y, hue
        );
        id
    }

    /// Overwrites the stored movement mask and flags the participant as moved.
    ///
    /// Returns false for an id that is no longer registered; callers drop such
    /// intents silently.
    pub fn apply_intent(&self, id: u32, mask: u8) -> bool {
        match self.participants.get(&id) {
            Some(participant) => {
                participant.intent.set(mask);
                true
            }
            None => {
                debug!("Dropping intent for unknown participant {}", id);
                false
            }
        }
    }

    /// Removes a participant immediately; others learn about it at the next
    /// tick boundary.
    pub fn remove(&mut self, id: u32) -> bool {
        if self.participants.remove(&id).is_some() {
            self.diff.record_leave(id);
            info!("Participant {} left", id);
            true
        } else {
            false
        }
    }

    /// Live ids in ascending order.
    pub fn snapshot(&self) -> Vec<u32> {
        self.participants.keys().copied().collect()
    }

    pub fn get(&self, id: u32) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Drains the diff set. Only the tick scheduler calls this.
    pub fn take_diff(&mut self) -> TickDiff {
        self.diff.drain()
    }

    /// Advances every participant by `dt` seconds under its current mask.
    pub fn integrate(&mut self, dt: f32) {
        let world = self.world;
        for participant in self.participants.values_mut() {
            let mask = participant.intent.mask();
            participant.position = shared::simulate(&world, participant.position, mask, dt);
        }
    }

    pub fn clear_moved(&self) {
        for participant in self.participants.values() {
            participant.intent.clear_moved();
        }
    }
}
