//! Movement-intent sources: edge-triggered direction keys and a goal-seeking bot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Direction, Position, World};

/// Default distance at which the bot counts an axis as reached.
pub const DEFAULT_EPSILON: f32 = 4.0;

/// Tracks the asserted direction bits and reports only real changes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MovementInput {
    mask: u8,
}

impl MovementInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Key went down. Returns the new mask if it changed.
    pub fn press(&mut self, direction: Direction) -> Option<u8> {
        self.set(direction.apply(self.mask, true))
    }

    /// Key went up. Returns the new mask if it changed.
    pub fn release(&mut self, direction: Direction) -> Option<u8> {
        self.set(direction.apply(self.mask, false))
    }

    /// Replaces the whole mask. Returns it if it changed.
    pub fn set(&mut self, mask: u8) -> Option<u8> {
        if mask == self.mask {
            None
        } else {
            self.mask = mask;
            Some(mask)
        }
    }
}

/// Bot that walks towards a random goal, one axis at a time.
///
/// The x axis is handled before the y axis. Exactly one direction bit is
/// asserted while travelling; once both deltas are within `epsilon` a fresh
/// goal is drawn uniformly from the world.
pub struct GoalSeeker {
    world: World,
    epsilon: f32,
    goal: Position,
    input: MovementInput,
    rng: StdRng,
}

impl GoalSeeker {
    pub fn new(world: World, epsilon: f32) -> Self {
        Self::with_rng(world, epsilon, StdRng::from_entropy())
    }

    pub fn seeded(world: World, epsilon: f32, seed: u64) -> Self {
        Self::with_rng(world, epsilon, StdRng::seed_from_u64(seed))
    }

    fn with_rng(world: World, epsilon: f32, mut rng: StdRng) -> Self {
        let goal = Self::random_goal(&world, &mut rng);
        Self {
            world,
            epsilon,
            goal,
            input: MovementInput::new(),
            rng,
        }
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn set_goal(&mut self, goal: Position) {
        self.goal = goal;
    }

    pub fn mask(&self) -> u8 {
        self.input.mask()
    }

    fn random_goal(world: &World, rng: &mut StdRng) -> Position {
        Position::new(rng.gen_range(0.0..world.width), rng.gen_range(0.0..world.height))
    }

    fn heading(&self, position: Position) -> Option<Direction> {
        let dx = self.goal.x - position.x;
        let dy = self.goal.y - position.y;

        if dx.abs() > self.epsilon {
            Some(if dx > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            })
        } else if dy.abs() > self.epsilon {
            Some(if dy > 0.0 {
                Direction::Down
            } else {
                Direction::Up
            })
        } else {
            None
        }
    }

    /// Steers from `position`. Returns the new mask when it changed.
    pub fn update(&mut self, position: Position) -> Option<u8> {
        let heading = match self.heading(position) {
            Some(direction) => Some(direction),
            None => {
                self.goal = Self::random_goal(&self.world, &mut self.rng);
                self.heading(position)
            }
        };

        self.input.set(heading.map_or(0, Direction::bit))
    }
}
