//! Frame codec for the gimbal command protocol.
//!
//! Every frame is seven bytes:
//!
//! ```text
//! [0xFF, address, cmd1, cmd2, data1, data2, checksum]
//! ```
//!
//! where `checksum` is the sum of `address..=data2` modulo 256.

use crate::{
    constants::*,
    error::ProtocolError,
    types::{Address, Direction, PanDirection, Speed, TiltDirection},
};
use std::fmt;

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub fn encode(address: Address, cmd1: u8, cmd2: u8, data1: u8, data2: u8) -> Self {
        let mut bytes = [START_BYTE, address.0, cmd1, cmd2, data1, data2, 0];
        bytes[FRAME_LEN - 1] = checksum(&bytes[1..FRAME_LEN - 1]);
        Frame(bytes)
    }

    /// Validate raw bytes as a frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| ProtocolError::InvalidLength {
            expected: FRAME_LEN,
            actual: bytes.len(),
        })?;

        if bytes[0] != START_BYTE {
            return Err(ProtocolError::BadStartByte(bytes[0]));
        }

        let expected = checksum(&bytes[1..FRAME_LEN - 1]);
        let actual = bytes[FRAME_LEN - 1];
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }

        Ok(Frame(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn address(&self) -> Address {
        Address(self.0[1])
    }

    pub fn commands(&self) -> (u8, u8) {
        (self.0[2], self.0[3])
    }

    pub fn data(&self) -> (u8, u8) {
        (self.0[4], self.0[5])
    }

    pub fn checksum(&self) -> u8 {
        self.0[FRAME_LEN - 1]
    }

    pub fn is_stop(&self) -> bool {
        self.commands() == (CMD1_NONE, CMD2_STOP) && self.data() == (0, 0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// A semantic command, independent of the target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pan(PanDirection, Speed),
    Tilt(TiltDirection, Speed),
    /// Pan and tilt together in a single frame.
    Diagonal(PanDirection, TiltDirection, Speed),
    Stop,
}

fn pan_bits(pan: PanDirection) -> u8 {
    match pan {
        PanDirection::Left => CMD2_PAN_LEFT,
        PanDirection::Right => CMD2_PAN_RIGHT,
    }
}

fn tilt_bits(tilt: TiltDirection) -> u8 {
    match tilt {
        TiltDirection::Up => CMD2_TILT_UP,
        TiltDirection::Down => CMD2_TILT_DOWN,
    }
}

impl Command {
    pub fn for_direction(direction: Direction, speed: Speed) -> Self {
        match (direction.pan(), direction.tilt()) {
            (Some(pan), _) => Command::Pan(pan, speed),
            (_, Some(tilt)) => Command::Tilt(tilt, speed),
            _ => Command::Stop,
        }
    }

    /// `(cmd1, cmd2, data1, data2)` for this command.
    pub fn bytes(&self) -> (u8, u8, u8, u8) {
        match *self {
            Command::Pan(pan, speed) => (CMD1_NONE, pan_bits(pan), speed.get(), 0x00),
            Command::Tilt(tilt, speed) => (CMD1_NONE, tilt_bits(tilt), 0x00, speed.get()),
            Command::Diagonal(pan, tilt, speed) => (
                CMD1_NONE,
                pan_bits(pan) | tilt_bits(tilt),
                speed.get(),
                speed.get(),
            ),
            Command::Stop => (CMD1_NONE, CMD2_STOP, 0x00, 0x00),
        }
    }

    pub fn to_frame(&self, address: Address) -> Frame {
        let (cmd1, cmd2, data1, data2) = self.bytes();
        Frame::encode(address, cmd1, cmd2, data1, data2)
    }
}

pub fn pan_left(address: Address, speed: Speed) -> Frame {
    Command::Pan(PanDirection::Left, speed).to_frame(address)
}

pub fn pan_right(address: Address, speed: Speed) -> Frame {
    Command::Pan(PanDirection::Right, speed).to_frame(address)
}

pub fn tilt_up(address: Address, speed: Speed) -> Frame {
    Command::Tilt(TiltDirection::Up, speed).to_frame(address)
}

pub fn tilt_down(address: Address, speed: Speed) -> Frame {
    Command::Tilt(TiltDirection::Down, speed).to_frame(address)
}

pub fn stop(address: Address) -> Frame {
    Command::Stop.to_frame(address)
}
