//! Binary wire codec.
//!
//! Every frame is one transport message and starts with a one-byte kind tag.
//! Bodies are fixed-width little-endian fields with no padding, written with
//! bincode's default (fixint, little-endian) encoding:
//!
//! | Kind              | Body                                  | Size        |
//! |-------------------|---------------------------------------|-------------|
//! | Hello             | id u32, x f32, y f32, hue u8          | 14          |
//! | ParticipantJoined | id u32, x f32, y f32, hue u8, mask u8 | 15          |
//! | ParticipantLeft   | id u32                                | 5           |
//! | MovementIntent    | mask u8                               | 2           |
//! | Batch             | count u16, then `count` records       | 3 + 14 * n  |
//! | Ping / Pong       | timestamp u32                         | 5           |
//!
//! Decoding never attempts partial recovery: a wrong size or a wrong tag is a
//! hard error and the caller is expected to drop the connection.

use crate::ParticipantState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HELLO_SIZE: usize = 14;
pub const PARTICIPANT_JOINED_SIZE: usize = 15;
pub const PARTICIPANT_LEFT_SIZE: usize = 5;
pub const MOVEMENT_INTENT_SIZE: usize = 2;
pub const BATCH_HEADER_SIZE: usize = 3;
pub const PARTICIPANT_RECORD_SIZE: usize = 14;
pub const PING_SIZE: usize = 5;
pub const PONG_SIZE: usize = 5;

/// Largest number of records one batch frame can carry.
pub const MAX_BATCH_RECORDS: usize = u16::MAX as usize;

/// Leading tag of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 0,
    ParticipantJoined = 1,
    ParticipantLeft = 2,
    MovementIntent = 3,
    Batch = 4,
    Ping = 5,
    Pong = 6,
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FrameKind::Hello),
            1 => Some(FrameKind::ParticipantJoined),
            2 => Some(FrameKind::ParticipantLeft),
            3 => Some(FrameKind::MovementIntent),
            4 => Some(FrameKind::Batch),
            5 => Some(FrameKind::Ping),
            6 => Some(FrameKind::Pong),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Exact frame size, or `None` for the variable-length batch.
    pub fn wire_size(self) -> Option<usize> {
        match self {
            FrameKind::Hello => Some(HELLO_SIZE),
            FrameKind::ParticipantJoined => Some(PARTICIPANT_JOINED_SIZE),
            FrameKind::ParticipantLeft => Some(PARTICIPANT_LEFT_SIZE),
            FrameKind::MovementIntent => Some(MOVEMENT_INTENT_SIZE),
            FrameKind::Batch => None,
            FrameKind::Ping => Some(PING_SIZE),
            FrameKind::Pong => Some(PONG_SIZE),
        }
    }

    /// Kinds a client may send to the server.
    pub fn is_server_bound(self) -> bool {
        matches!(self, FrameKind::MovementIntent | FrameKind::Ping)
    }

    /// Kinds the server may send to a client.
    pub fn is_client_bound(self) -> bool {
        !self.is_server_bound()
    }
}

/// Private greeting carrying the receiver's own identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub hue: u8,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    #[error("kind tag mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: u8, actual: u8 },

    #[error("{kind:?} frame must be {expected} bytes, got {actual}")]
    WrongLength {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },

    #[error("batch frame of {actual} bytes is not a header plus whole records")]
    BatchLength { actual: usize },

    #[error("batch header declares {declared} records but {actual} are present")]
    BatchCount { declared: u16, actual: usize },

    #[error("batch of {0} records exceeds the u16 count field")]
    BatchTooLarge(usize),

    #[error("{0:?} frame is not valid in this direction")]
    UnexpectedDirection(FrameKind),

    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(Hello),
    ParticipantJoined(ParticipantState),
    ParticipantLeft { id: u32 },
    MovementIntent { mask: u8 },
    Batch(Vec<ParticipantState>),
    Ping { timestamp: u32 },
    Pong { timestamp: u32 },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Hello(_) => FrameKind::Hello,
            Frame::ParticipantJoined(_) => FrameKind::ParticipantJoined,
            Frame::ParticipantLeft { .. } => FrameKind::ParticipantLeft,
            Frame::MovementIntent { .. } => FrameKind::MovementIntent,
            Frame::Batch(_) => FrameKind::Batch,
            Frame::Ping { .. } => FrameKind::Ping,
            Frame::Pong { .. } => FrameKind::Pong,
        }
    }

    /// Size in bytes of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Batch(records) => BATCH_HEADER_SIZE + records.len() * PARTICIPANT_RECORD_SIZE,
            other => other.kind().wire_size().unwrap_or(0),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.kind().tag());

        match self {
            Frame::Hello(hello) => bincode::serialize_into(&mut buf, hello)?,
            Frame::ParticipantJoined(state) => bincode::serialize_into(&mut buf, state)?,
            Frame::ParticipantLeft { id } => bincode::serialize_into(&mut buf, id)?,
            Frame::MovementIntent { mask } => bincode::serialize_into(&mut buf, mask)?,
            Frame::Batch(records) => {
                let count = u16::try_from(records.len())
                    .map_err(|_| ProtocolError::BatchTooLarge(records.len()))?;
                bincode::serialize_into(&mut buf, &count)?;
                for record in records {
                    bincode::serialize_into(&mut buf, record)?;
                }
            }
            Frame::Ping { timestamp } | Frame::Pong { timestamp } => {
                bincode::serialize_into(&mut buf, timestamp)?
            }
        }

        Ok(buf)
    }

    /// Decodes a frame of any kind, dispatching on the leading tag.
    pub fn decode(buf: &[u8]) -> Result<Frame, ProtocolError> {
        let tag = *buf.first().ok_or(ProtocolError::Empty)?;
        let kind = FrameKind::from_tag(tag).ok_or(ProtocolError::UnknownKind(tag))?;
        Self::decode_as(kind, buf)
    }

    /// Decodes `buf` as a frame of exactly `expected` kind. Both the total
    /// length and the leading tag must agree with `expected`.
    pub fn decode_as(expected: FrameKind, buf: &[u8]) -> Result<Frame, ProtocolError> {
        check_length(expected, buf.len())?;

        let tag = buf[0];
        if tag != expected.tag() {
            return Err(ProtocolError::KindMismatch {
                expected: expected.tag(),
                actual: tag,
            });
        }

        let body = &buf[1..];
        let frame = match expected {
            FrameKind::Hello => Frame::Hello(bincode::deserialize(body)?),
            FrameKind::ParticipantJoined => Frame::ParticipantJoined(bincode::deserialize(body)?),
            FrameKind::ParticipantLeft => Frame::ParticipantLeft {
                id: bincode::deserialize(body)?,
            },
            FrameKind::MovementIntent => Frame::MovementIntent { mask: body[0] },
            FrameKind::Batch => Frame::Batch(decode_batch_records(buf)?),
            FrameKind::Ping => Frame::Ping {
                timestamp: bincode::deserialize(body)?,
            },
            FrameKind::Pong => Frame::Pong {
                timestamp: bincode::deserialize(body)?,
            },
        };

        Ok(frame)
    }

    /// Decodes a frame received by the server.
    pub fn decode_server_bound(buf: &[u8]) -> Result<Frame, ProtocolError> {
        let frame = Self::decode(buf)?;
        if !frame.kind().is_server_bound() {
            return Err(ProtocolError::UnexpectedDirection(frame.kind()));
        }
        Ok(frame)
    }

    /// Decodes a frame received by a client.
    pub fn decode_client_bound(buf: &[u8]) -> Result<Frame, ProtocolError> {
        let frame = Self::decode(buf)?;
        if !frame.kind().is_client_bound() {
            return Err(ProtocolError::UnexpectedDirection(frame.kind()));
        }
        Ok(frame)
    }
}

fn check_length(kind: FrameKind, len: usize) -> Result<(), ProtocolError> {
    match kind.wire_size() {
        Some(expected) if expected == len => Ok(()),
        Some(expected) => Err(ProtocolError::WrongLength {
            kind,
            expected,
            actual: len,
        }),
        None if len >= BATCH_HEADER_SIZE
            && (len - BATCH_HEADER_SIZE) % PARTICIPANT_RECORD_SIZE == 0 =>
        {
            Ok(())
        }
        None => Err(ProtocolError::BatchLength { actual: len }),
    }
}

fn decode_batch_records(buf: &[u8]) -> Result<Vec<ParticipantState>, ProtocolError> {
    let declared: u16 = bincode::deserialize(&buf[1..BATCH_HEADER_SIZE])?;
    let records = &buf[BATCH_HEADER_SIZE..];
    let actual = records.len() / PARTICIPANT_RECORD_SIZE;
    if declared as usize != actual {
        return Err(ProtocolError::BatchCount { declared, actual });
    }

    records
        .chunks_exact(PARTICIPANT_RECORD_SIZE)
        .map(|chunk| bincode::deserialize::<ParticipantState>(chunk).map_err(ProtocolError::from))
        .collect()
}
