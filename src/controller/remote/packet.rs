use core::fmt;

/// Longest frame on the wire, length and CRC bytes included
pub const MAX_FRAME_SIZE: usize = 32;

/// Longest payload that fits a frame
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - 2;

const CRC_TABLE: [u8; 8] = [0x5E, 0xBC, 0x61, 0xC2, 0x9D, 0x23, 0x46, 0x8C];

/// 8-bit CRC (reflected, polynomial 0x31)
pub fn crc_update(crc: u8, byte: u8) -> u8 {
    let d = crc ^ byte;
    CRC_TABLE
        .iter()
        .enumerate()
        .filter(|(bit, _)| d & (1 << bit) != 0)
        .fold(0, |crc, (_, value)| crc ^ value)
}

pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, byte| crc_update(crc, *byte))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Length byte of zero
    Empty,
    /// Frame exceeds [MAX_FRAME_SIZE]
    TooLong(usize),
    /// Length byte disagrees with the received byte count
    LengthMismatch { declared: usize, received: usize },
    Crc { expected: u8, received: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameError::Empty => write!(f, "Empty payload"),
            FrameError::TooLong(len) => write!(f, "Frame too long: {} bytes", len),
            FrameError::LengthMismatch { declared, received } => {
                write!(f, "Length mismatch: declared {} payload bytes, received {} bytes", declared, received)
            }
            FrameError::Crc { expected, received } => write!(f, "CRC mismatch: expected {:#04x}, received {:#04x}", expected, received),
        }
    }
}

impl std::error::Error for FrameError {}

/// Raw frame buffer: `length`, `payload[length]`, `crc`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Frame {
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_FRAME_SIZE],
            len: 0,
        }
    }

    /// Append a received byte. Returns [false] once the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len >= MAX_FRAME_SIZE {
            return false;
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame {:02x?}", self.as_bytes())
    }
}

/// A validated payload
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    payload: [u8; MAX_PAYLOAD_SIZE],
    len: usize,
}

impl Packet {
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::TooLong(payload.len() + 2));
        }

        let mut packet = Self {
            payload: [0; MAX_PAYLOAD_SIZE],
            len: payload.len(),
        };
        packet.payload[..payload.len()].copy_from_slice(payload);
        Ok(packet)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Wrap the payload in a frame, CRC over length and payload
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new();
        frame.push(self.len as u8);
        for byte in self.payload() {
            frame.push(*byte);
        }
        frame.push(crc8(frame.as_bytes()));
        frame
    }
}

impl TryFrom<&[u8]> for Packet {
    type Error = FrameError;

    /// Validate a received frame
    fn try_from(frame: &[u8]) -> Result<Self, Self::Error> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLong(frame.len()));
        }

        let declared = usize::from(*frame.first().ok_or(FrameError::Empty)?);
        if declared == 0 {
            return Err(FrameError::Empty);
        }
        if frame.len() != declared + 2 {
            return Err(FrameError::LengthMismatch {
                declared,
                received: frame.len(),
            });
        }

        let (body, crc) = frame.split_at(declared + 1);
        let expected = crc8(body);
        if crc[0] != expected {
            return Err(FrameError::Crc {
                expected,
                received: crc[0],
            });
        }

        Packet::new(&body[1..])
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet {:02x?}", self.payload())
    }
}
