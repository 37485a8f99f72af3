//! Client-side mirror of the replicated world.

use log::{debug, trace};
use shared::{Frame, ParticipantState, World};
use std::collections::BTreeMap;

/// Local copy of every participant the server has told us about.
///
/// Server frames overwrite mirrored state; between frames [`ClientWorld::predict`]
/// extrapolates positions with the shared integrator.
#[derive(Debug, Clone)]
pub struct ClientWorld {
    world: World,
    own_id: Option<u32>,
    participants: BTreeMap<u32, ParticipantState>,
}

impl ClientWorld {
    pub fn new(world: World) -> Self {
        Self {
            world,
            own_id: None,
            participants: BTreeMap::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Id assigned by the server's Hello, if it has arrived.
    pub fn own_id(&self) -> Option<u32> {
        self.own_id
    }

    pub fn own(&self) -> Option<&ParticipantState> {
        self.own_id.and_then(|id| self.participants.get(&id))
    }

    pub fn get(&self, id: u32) -> Option<&ParticipantState> {
        self.participants.get(&id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.participants.keys().copied().collect()
    }

    /// Applies one verified server frame.
    pub fn apply(&mut self, frame: &Frame) {
        match frame {
            Frame::Hello(hello) => {
                debug!("Assigned participant id {}", hello.id);
                self.own_id = Some(hello.id);
                self.participants.insert(
                    hello.id,
                    ParticipantState {
                        id: hello.id,
                        x: hello.x,
                        y: hello.y,
                        hue: hello.hue,
                        mask: 0,
                    },
                );
            }
            Frame::ParticipantJoined(state) => {
                trace!("Participant {} joined", state.id);
                self.participants.insert(state.id, *state);
            }
            Frame::ParticipantLeft { id } => {
                if self.participants.remove(id).is_none() {
                    trace!("Leave for unknown participant {} ignored", id);
                }
            }
            Frame::Batch(records) => {
                for record in records {
                    self.participants.insert(record.id, *record);
                }
            }
            Frame::Pong { .. } | Frame::MovementIntent { .. } | Frame::Ping { .. } => {}
        }
    }

    /// Records our own intent locally so prediction starts before the server echoes it.
    pub fn set_own_mask(&mut self, mask: u8) {
        if let Some(id) = self.own_id {
            if let Some(own) = self.participants.get_mut(&id) {
                own.mask = mask;
            }
        }
    }

    /// Advances every mirrored participant by `dt` seconds under its last known mask.
    pub fn predict(&mut self, dt: f32) {
        let world = self.world;
        for state in self.participants.values_mut() {
            let next = shared::simulate(&world, state.position(), state.mask, dt);
            state.set_position(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Direction, Hello};

    fn state(id: u32, x: f32, y: f32, mask: u8) -> ParticipantState {
        ParticipantState {
            id,
            x,
            y,
            hue: 10,
            mask,
        }
    }

    #[test]
    fn test_hello_sets_own_id() {
        let mut mirror = ClientWorld::new(World::default());
        assert_eq!(mirror.own_id(), None);

        mirror.apply(&Frame::Hello(Hello {
            id: 4,
            x: 10.0,
            y: 20.0,
            hue: 99,
        }));

        assert_eq!(mirror.own_id(), Some(4));
        let own = mirror.own().unwrap();
        assert_eq!(own.x, 10.0);
        assert_eq!(own.hue, 99);
        assert_eq!(own.mask, 0);
    }

    #[test]
    fn test_join_and_leave() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::ParticipantJoined(state(1, 5.0, 5.0, 0)));
        mirror.apply(&Frame::ParticipantJoined(state(2, 6.0, 6.0, 0)));
        assert_eq!(mirror.ids(), vec![1, 2]);

        mirror.apply(&Frame::ParticipantLeft { id: 1 });
        assert_eq!(mirror.ids(), vec![2]);
    }

    #[test]
    fn test_leave_for_unknown_id_is_ignored() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::ParticipantJoined(state(1, 5.0, 5.0, 0)));
        mirror.apply(&Frame::ParticipantLeft { id: 77 });
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn test_batch_overwrites_and_inserts() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::ParticipantJoined(state(1, 5.0, 5.0, 0)));

        mirror.apply(&Frame::Batch(vec![
            state(1, 50.0, 60.0, Direction::Up.bit()),
            state(3, 1.0, 2.0, 0),
        ]));

        let first = mirror.get(1).unwrap();
        assert_eq!((first.x, first.y), (50.0, 60.0));
        assert_eq!(first.mask, Direction::Up.bit());
        assert!(mirror.get(3).is_some());
    }

    #[test]
    fn test_pong_does_not_touch_mirror() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::Pong { timestamp: 5 });
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_predict_uses_each_mask() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::Batch(vec![
            state(1, 100.0, 100.0, Direction::Right.bit()),
            state(2, 100.0, 100.0, 0),
        ]));

        mirror.predict(0.5);

        assert_approx_eq!(mirror.get(1).unwrap().x, 250.0);
        assert_approx_eq!(mirror.get(2).unwrap().x, 100.0);
    }

    #[test]
    fn test_predict_wraps() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::Batch(vec![state(1, 790.0, 10.0, Direction::Right.bit())]));

        mirror.predict(0.1);

        assert_approx_eq!(mirror.get(1).unwrap().x, 20.0, 1e-3);
    }

    #[test]
    fn test_own_mask_drives_prediction() {
        let mut mirror = ClientWorld::new(World::default());
        mirror.apply(&Frame::Hello(Hello {
            id: 0,
            x: 100.0,
            y: 100.0,
            hue: 0,
        }));

        mirror.set_own_mask(Direction::Down.bit());
        mirror.predict(0.1);

        assert_approx_eq!(mirror.own().unwrap().y, 130.0, 1e-3);
    }
}
