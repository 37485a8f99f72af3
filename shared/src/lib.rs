//! Types shared by the authoritative server and its clients: world constants,
//! the replicated participant record, the binary wire codec and the motion
//! integrator both sides run.

pub mod motion;
pub mod protocol;

pub use motion::{displacement, simulate, Direction, Position, UNIT_VECTORS};
pub use protocol::{Frame, FrameKind, Hello, ProtocolError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const PARTICIPANT_SIZE: f32 = 32.0;
pub const PARTICIPANT_SPEED: f32 = 300.0;

/// Static world parameters, fixed at process start.
///
/// `participant_size` is visual only; nothing in the simulation collides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct World {
    pub width: f32,
    pub height: f32,
    pub participant_size: f32,
    /// Distance per second along each asserted direction.
    pub speed: f32,
}

impl Default for World {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            participant_size: PARTICIPANT_SIZE,
            speed: PARTICIPANT_SPEED,
        }
    }
}

/// A world parameter that would make spawning or wrapping meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum WorldError {
    #[error("world dimensions must be finite and positive, got {width}x{height}")]
    Dimensions { width: f32, height: f32 },

    #[error("speed must be finite and non-negative, got {0}")]
    Speed(f32),
}

impl World {
    pub fn validate(&self) -> Result<(), WorldError> {
        let extent_ok = |v: f32| v.is_finite() && v > 0.0;
        if !(extent_ok(self.width) && extent_ok(self.height)) {
            return Err(WorldError::Dimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return Err(WorldError::Speed(self.speed));
        }
        Ok(())
    }

    pub fn contains(&self, position: Position) -> bool {
        (0.0..self.width).contains(&position.x) && (0.0..self.height).contains(&position.y)
    }
}

/// Everything other participants learn about one participant.
///
/// This is both the body of a `ParticipantJoined` frame and one record of a
/// batch snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Colour angle, linearly mapped from 0..=255 onto [0, 360).
    pub hue: u8,
    pub mask: u8,
}

impl ParticipantState {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Position) {
        self.x = position.x;
        self.y = position.y;
    }
}

/// Converts a hue byte into degrees in [0, 360).
pub fn hue_degrees(hue: u8) -> f32 {
    hue as f32 * 360.0 / 256.0
}
