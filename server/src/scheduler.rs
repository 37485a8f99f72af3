//! Fixed-rate tick scheduler.
//!
//! One cycle runs these steps in order; later steps rely on what earlier steps
//! have already sent:
//!
//! 1. Collect: drain the diff set (join-then-leave pairs cancel out)
//! 2. Welcome: private Hello plus the catch-up roster for each newcomer
//! 3. Announce joins to everyone else
//! 4. Announce leaves to everyone still connected
//! 5. Broadcast movement as batch snapshots
//! 6. Integrate positions over the elapsed time
//! 7. Reset moved flags and per-cycle counters

use crate::broadcast::{Broadcaster, Traffic};
use crate::config::BroadcastPolicy;
use crate::registry::Registry;
use log::debug;
use shared::{Frame, ParticipantState};
use std::collections::HashSet;

/// Counters owned by the scheduler, updated once per cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u64,
    pub totals: Traffic,
    pub joins: u64,
    pub leaves: u64,
    /// Join/leave pairs that cancelled inside one interval.
    pub cancelled: u64,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub tick: u64,
    pub joined: Vec<u32>,
    pub left: Vec<u32>,
    /// Records included in the movement snapshot.
    pub movers: usize,
    pub traffic: Traffic,
}

pub struct TickScheduler {
    policy: BroadcastPolicy,
    broadcaster: Broadcaster,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(policy: BroadcastPolicy) -> Self {
        Self {
            policy,
            broadcaster: Broadcaster::new(),
            stats: TickStats::default(),
        }
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Runs one full cycle. `dt` is the wall-clock time in seconds since the
    /// previous cycle started.
    pub fn run_cycle(&mut self, registry: &mut Registry, dt: f32) -> CycleReport {
        let diff = registry.take_diff();

        self.welcome(registry, &diff.joined);
        self.announce_joins(registry, &diff.joined);
        self.announce_leaves(registry, &diff.left);
        let movers = self.broadcast_movement(registry);

        registry.integrate(dt);

        registry.clear_moved();
        let traffic = self.broadcaster.take_traffic();

        self.stats.tick += 1;
        self.stats.totals.absorb(traffic);
        self.stats.joins += diff.joined.len() as u64;
        self.stats.leaves += diff.left.len() as u64;
        self.stats.cancelled += diff.cancelled.len() as u64;

        if !diff.joined.is_empty() || !diff.left.is_empty() || !diff.cancelled.is_empty() {
            debug!(
                "Tick {}: joined {:?}, left {:?}, cancelled {:?}",
                self.stats.tick, diff.joined, diff.left, diff.cancelled
            );
        }

        CycleReport {
            tick: self.stats.tick,
            joined: diff.joined,
            left: diff.left,
            movers,
            traffic,
        }
    }

    /// Hello plus one ParticipantJoined per established participant.
    ///
    /// Other newcomers of the same cycle are left out of the roster; they are
    /// learned through the announce step instead, so every pair meets once.
    fn welcome(&mut self, registry: &Registry, joined: &[u32]) {
        let newcomers: HashSet<u32> = joined.iter().copied().collect();

        for &id in joined {
            let Some(newcomer) = registry.get(id) else {
                continue;
            };

            self.broadcaster.send(newcomer, &Frame::Hello(newcomer.hello()));

            for other in registry.iter() {
                if other.id == id || newcomers.contains(&other.id) {
                    continue;
                }
                self.broadcaster
                    .send(newcomer, &Frame::ParticipantJoined(other.state()));
            }
        }
    }

    fn announce_joins(&mut self, registry: &Registry, joined: &[u32]) {
        for &id in joined {
            let Some(newcomer) = registry.get(id) else {
                continue;
            };
            let frame = Frame::ParticipantJoined(newcomer.state());
            self.broadcaster.broadcast(registry, &frame, Some(id));
        }
    }

    fn announce_leaves(&mut self, registry: &Registry, left: &[u32]) {
        for &id in left {
            self.broadcaster
                .broadcast(registry, &Frame::ParticipantLeft { id }, None);
        }
    }

    /// Returns the number of records sent.
    fn broadcast_movement(&mut self, registry: &Registry) -> usize {
        let records: Vec<ParticipantState> = registry
            .iter()
            .filter(|p| self.policy == BroadcastPolicy::EveryTick || p.intent.moved())
            .map(|p| p.state())
            .collect();

        if !records.is_empty() {
            self.broadcaster.broadcast_snapshot(registry, &records);
        }
        records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Outbox;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Direction, Hello, World};
    use tokio::sync::mpsc;

    struct Peer {
        id: u32,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl Peer {
        fn frames(&mut self) -> Vec<Frame> {
            let mut frames = Vec::new();
            while let Ok(bytes) = self.rx.try_recv() {
                frames.push(Frame::decode_client_bound(&bytes).unwrap());
            }
            frames
        }
    }

    fn connect(registry: &mut Registry) -> Peer {
        let (tx, rx): (Outbox, _) = mpsc::unbounded_channel();
        let id = registry.accept(tx);
        Peer { id, rx }
    }

    fn setup(policy: BroadcastPolicy) -> (Registry, TickScheduler) {
        (
            Registry::seeded(World::default(), 42),
            TickScheduler::new(policy),
        )
    }

    fn joined_ids(frames: &[Frame]) -> Vec<u32> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::ParticipantJoined(state) => Some(state.id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_newcomer_is_invisible_until_tick() {
        let (mut registry, _scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        assert!(a.frames().is_empty());
    }

    #[test]
    fn test_first_participant_gets_hello_and_empty_roster() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        let expected = registry.get(a.id).unwrap().hello();

        let report = scheduler.run_cycle(&mut registry, 0.0);

        assert_eq!(a.frames(), vec![Frame::Hello(expected)]);
        assert_eq!(report.joined, vec![a.id]);
        assert_eq!(report.tick, 1);
    }

    #[test]
    fn test_two_participant_scenario() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let dt = 1.0 / 30.0;

        let mut a = connect(&mut registry);
        scheduler.run_cycle(&mut registry, dt);
        let hello_a = a.frames();
        assert_eq!(a.id, 0);
        assert!(matches!(hello_a.as_slice(), [Frame::Hello(Hello { id: 0, .. })]));

        let mut b = connect(&mut registry);
        let state_a = registry.get(a.id).unwrap().state();
        let state_b = registry.get(b.id).unwrap().state();
        scheduler.run_cycle(&mut registry, dt);

        assert_eq!(
            b.frames(),
            vec![
                Frame::Hello(registry.get(b.id).unwrap().hello()),
                Frame::ParticipantJoined(state_a),
            ]
        );
        assert_eq!(a.frames(), vec![Frame::ParticipantJoined(state_b)]);

        registry.apply_intent(a.id, Direction::Right.bit());
        let x_before = registry.get(a.id).unwrap().position.x;
        let report = scheduler.run_cycle(&mut registry, dt);
        assert_eq!(report.movers, 1);

        for peer in [&mut a, &mut b] {
            let frames = peer.frames();
            assert_eq!(frames.len(), 1);
            match &frames[0] {
                Frame::Batch(records) => {
                    assert_eq!(records.len(), 1);
                    assert_eq!(records[0].id, 0);
                    assert_eq!(records[0].mask, Direction::Right.bit());
                    // Broadcast runs before integrate, so this cycle's motion shows up next cycle.
                    assert_eq!(records[0].x, x_before);
                }
                other => panic!("Expected batch, got {:?}", other),
            }
        }

        let x_after = registry.get(a.id).unwrap().position.x;
        let expected = (x_before + World::default().speed * dt).rem_euclid(World::default().width);
        assert_approx_eq!(x_after, expected, 1e-3);
    }

    #[test]
    fn test_join_and_leave_in_same_interval_cancel() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        let mut ghost = connect(&mut registry);
        registry.remove(ghost.id);
        let report = scheduler.run_cycle(&mut registry, 0.0);

        assert!(a.frames().is_empty());
        assert!(ghost.frames().is_empty());
        assert!(report.joined.is_empty());
        assert!(report.left.is_empty());
        assert_eq!(scheduler.stats().cancelled, 1);
    }

    #[test]
    fn test_cancelled_id_never_in_roster() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let ghost = connect(&mut registry);
        let mut b = connect(&mut registry);
        registry.remove(ghost.id);

        scheduler.run_cycle(&mut registry, 0.0);

        let frames = b.frames();
        assert!(matches!(frames.as_slice(), [Frame::Hello(_)]));
    }

    #[test]
    fn test_simultaneous_joiners_meet_exactly_once() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        let mut b = connect(&mut registry);
        let mut c = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);

        let frames_b = b.frames();
        let frames_c = c.frames();
        let frames_a = a.frames();

        let hellos = |frames: &[Frame]| {
            frames
                .iter()
                .filter(|f| matches!(f, Frame::Hello(_)))
                .count()
        };
        assert_eq!(hellos(&frames_b), 1);
        assert_eq!(hellos(&frames_c), 1);
        assert!(matches!(frames_b[0], Frame::Hello(Hello { id, .. }) if id == b.id));
        assert!(matches!(frames_c[0], Frame::Hello(Hello { id, .. }) if id == c.id));

        assert_eq!(joined_ids(&frames_b), vec![a.id, c.id]);
        assert_eq!(joined_ids(&frames_c), vec![a.id, b.id]);
        assert_eq!(joined_ids(&frames_a), vec![b.id, c.id]);
    }

    #[test]
    fn test_leave_reaches_remaining_participants() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        let b = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        registry.remove(b.id);
        let report = scheduler.run_cycle(&mut registry, 0.0);

        assert_eq!(a.frames(), vec![Frame::ParticipantLeft { id: b.id }]);
        assert_eq!(report.left, vec![b.id]);
    }

    #[test]
    fn test_leaves_are_batched_per_interval() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        let b = connect(&mut registry);
        let c = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        registry.remove(c.id);
        registry.remove(b.id);
        scheduler.run_cycle(&mut registry, 0.0);

        assert_eq!(
            a.frames(),
            vec![
                Frame::ParticipantLeft { id: c.id },
                Frame::ParticipantLeft { id: b.id },
            ]
        );
    }

    #[test]
    fn test_frames_follow_step_order() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        let b = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        let c = connect(&mut registry);
        registry.remove(b.id);
        registry.apply_intent(a.id, Direction::Up.bit());
        scheduler.run_cycle(&mut registry, 0.0);

        let frames = a.frames();
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], Frame::ParticipantJoined(s) if s.id == c.id));
        assert_eq!(frames[1], Frame::ParticipantLeft { id: b.id });
        assert!(matches!(&frames[2], Frame::Batch(records) if records.len() == 1));
    }

    #[test]
    fn test_moved_flags_reset_each_cycle() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        registry.apply_intent(a.id, Direction::Left.bit());
        assert_eq!(scheduler.run_cycle(&mut registry, 0.1).movers, 1);
        assert_eq!(a.frames().len(), 1);

        let report = scheduler.run_cycle(&mut registry, 0.1);
        assert_eq!(report.movers, 0);
        assert!(a.frames().is_empty());
        assert!(!registry.get(a.id).unwrap().intent.moved());
    }

    #[test]
    fn test_every_tick_policy_broadcasts_everyone() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::EveryTick);
        let mut a = connect(&mut registry);
        let mut b = connect(&mut registry);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();
        b.frames();

        registry.apply_intent(b.id, Direction::Down.bit());
        let dt = 0.05;
        let y_before = registry.get(b.id).unwrap().position.y;
        scheduler.run_cycle(&mut registry, dt);
        let report = scheduler.run_cycle(&mut registry, dt);
        assert_eq!(report.movers, 2);

        let frames = a.frames();
        assert_eq!(frames.len(), 2);
        match &frames[1] {
            Frame::Batch(records) => {
                let ids: Vec<u32> = records.iter().map(|r| r.id).collect();
                assert_eq!(ids, vec![a.id, b.id]);
                let expected =
                    (y_before + World::default().speed * dt).rem_euclid(World::default().height);
                assert_approx_eq!(records[1].y, expected, 1e-3);
            }
            other => panic!("Expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_registry_sends_nothing() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::EveryTick);
        let report = scheduler.run_cycle(&mut registry, 0.1);
        assert_eq!(report.movers, 0);
        assert_eq!(report.traffic, Traffic::default());
    }

    #[test]
    fn test_stats_accumulate_across_cycles() {
        let (mut registry, mut scheduler) = setup(BroadcastPolicy::OnChange);
        let mut a = connect(&mut registry);
        let first = scheduler.run_cycle(&mut registry, 0.0);
        assert_eq!(first.traffic.frames, 1);
        assert_eq!(first.traffic.bytes, 14);

        let b = connect(&mut registry);
        let second = scheduler.run_cycle(&mut registry, 0.0);
        // Hello + roster entry to b, announce to a.
        assert_eq!(second.traffic.frames, 3);
        registry.remove(b.id);
        scheduler.run_cycle(&mut registry, 0.0);
        a.frames();

        let stats = scheduler.stats();
        assert_eq!(stats.tick, 3);
        assert_eq!(stats.joins, 2);
        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.totals.frames, 5);
        assert_eq!(stats.totals.bytes, 14 + (14 + 15 + 15) + 5);
    }
}
