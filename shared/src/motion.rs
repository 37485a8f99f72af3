//! Deterministic motion integration shared by the server and client-side
//! prediction. Both sides must produce bit-identical results for the same
//! inputs, so everything here is plain `f32` arithmetic with no state.

use crate::World;

/// A point in world space. Positions handed out by [`simulate`] always
/// satisfy `0 <= x < width` and `0 <= y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One movement direction. The discriminant is both the ordinal into
/// [`UNIT_VECTORS`] and the bit index inside a movement mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
}

/// Unit vectors indexed by direction ordinal. Screen coordinates: y grows down.
pub const UNIT_VECTORS: [(f32, f32); 4] = [(-1.0, 0.0), (1.0, 0.0), (0.0, -1.0), (0.0, 1.0)];

/// Bits above the four direction bits carry no meaning.
pub const MASK_BITS: u8 = 0b1111;

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn unit_vector(self) -> (f32, f32) {
        UNIT_VECTORS[self.ordinal()]
    }

    pub fn is_set(self, mask: u8) -> bool {
        mask & self.bit() != 0
    }

    /// Returns `mask` with this direction asserted or cleared.
    pub fn apply(self, mask: u8, asserted: bool) -> u8 {
        if asserted {
            mask | self.bit()
        } else {
            mask & !self.bit()
        }
    }
}

/// Pre-wrap displacement for one step: the sum of the unit vectors of every
/// asserted direction, scaled by `speed * dt`. Opposing bits cancel.
pub fn displacement(mask: u8, speed: f32, dt: f32) -> (f32, f32) {
    let mut dx = 0.0;
    let mut dy = 0.0;
    for direction in Direction::ALL {
        if direction.is_set(mask) {
            let (ux, uy) = direction.unit_vector();
            dx += ux;
            dy += uy;
        }
    }
    (dx * speed * dt, dy * speed * dt)
}

/// Advances `position` by `dt` seconds under `mask` and wraps both axes into
/// the world.
pub fn simulate(world: &World, position: Position, mask: u8, dt: f32) -> Position {
    let (dx, dy) = displacement(mask, world.speed, dt);
    Position {
        x: wrap(position.x + dx, world.width),
        y: wrap(position.y + dy, world.height),
    }
}

/// True modulo into `[0, extent)`.
///
/// `rem_euclid` can round up to exactly `extent` for tiny negative inputs,
/// which would break the half-open bound.
fn wrap(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}
