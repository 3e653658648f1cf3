//! Half-duplex, clock synchronous two-wire link.
//!
//! The peer always drives the clock. Whoever sends drives the data wire, bits are
//! sampled on the rising clock edge, least significant bit first.

use core::fmt;
use std::time::{Duration, Instant};

use super::packet::{Frame, FrameError, Packet};

/// Longest wait for the peer to answer a handshake step
pub const ACCEPT_TIMEOUT: Duration = Duration::from_millis(5);

/// Longest wait for a clock edge within a frame
pub const BIT_TIMEOUT: Duration = Duration::from_micros(200);

pub trait WireLink: Send {
    /// Level of the clock wire
    fn clock(&mut self) -> bool;

    /// Level of the data wire, as driven by the peer
    fn data(&mut self) -> bool;

    /// Switch the data wire to output and drive `high`
    fn drive_data(&mut self, high: bool);

    /// Switch the data wire back to input
    fn release_data(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveError {
    /// Clock did not drop after the request was acknowledged
    AcceptTimeout,
    /// Clock stopped in the middle of a byte
    Framing { byte: usize, bit: u8 },
    Frame(FrameError),
}

impl From<FrameError> for ReceiveError {
    fn from(err: FrameError) -> Self {
        ReceiveError::Frame(err)
    }
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ReceiveError::AcceptTimeout => write!(f, "Peer did not accept"),
            ReceiveError::Framing { byte, bit } => write!(f, "Framing error at byte {} bit {}", byte, bit),
            ReceiveError::Frame(ref err) => write!(f, "Invalid frame: {}", err),
        }
    }
}

impl std::error::Error for ReceiveError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// Peer did not raise the clock after the announcement
    AnnounceTimeout,
    /// Peer did not drop the clock after the announcement
    AcceptTimeout,
    /// Clock stopped while sending
    Clock { byte: usize, bit: u8 },
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SendError::AnnounceTimeout => write!(f, "Peer did not answer the announcement"),
            SendError::AcceptTimeout => write!(f, "Peer did not accept"),
            SendError::Clock { byte, bit } => write!(f, "Clock stopped at byte {} bit {}", byte, bit),
        }
    }
}

impl std::error::Error for SendError {}

/// Poll the clock until it reaches `level`. Returns [false] on timeout.
fn wait_clock(link: &mut dyn WireLink, level: bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if link.clock() == level {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}

/// Accept and read a frame if the peer is requesting one.
///
/// Returns `Ok(None)` when no request is pending.
pub fn receive(link: &mut dyn WireLink) -> Result<Option<Packet>, ReceiveError> {
    if !link.clock() {
        return Ok(None);
    }

    link.drive_data(true);
    let accepted = wait_clock(link, false, ACCEPT_TIMEOUT);
    link.release_data();
    if !accepted {
        return Err(ReceiveError::AcceptTimeout);
    }

    let mut frame = Frame::new();
    'frame: loop {
        let mut byte = 0u8;
        for bit in 0..8 {
            if !wait_clock(link, true, BIT_TIMEOUT) {
                if bit == 0 {
                    // clock idle at a byte boundary ends the frame
                    break 'frame;
                }
                return Err(ReceiveError::Framing { byte: frame.len(), bit });
            }
            if link.data() {
                byte |= 1 << bit;
            }
            if !wait_clock(link, false, BIT_TIMEOUT) {
                return Err(ReceiveError::Framing { byte: frame.len(), bit });
            }
        }

        if !frame.push(byte) {
            return Err(FrameError::TooLong(frame.len() + 1).into());
        }
    }

    tracing::trace!("Received {:?}", frame);
    Ok(Some(Packet::try_from(frame.as_bytes())?))
}

/// Ask the peer to clock in a reply: raise data, wait for the clock to go high, drop
/// data and wait for the clock to return low.
pub fn announce(link: &mut dyn WireLink) -> Result<(), SendError> {
    link.drive_data(true);
    if !wait_clock(link, true, ACCEPT_TIMEOUT) {
        return Err(SendError::AnnounceTimeout);
    }

    link.drive_data(false);
    if !wait_clock(link, false, ACCEPT_TIMEOUT) {
        return Err(SendError::AcceptTimeout);
    }
    Ok(())
}

/// Clock out a frame after a successful [announce]
pub fn send(link: &mut dyn WireLink, frame: &Frame) -> Result<(), SendError> {
    for (index, byte) in frame.as_bytes().iter().enumerate() {
        for bit in 0..8 {
            link.drive_data(byte & (1 << bit) != 0);
            if !wait_clock(link, true, BIT_TIMEOUT) || !wait_clock(link, false, BIT_TIMEOUT) {
                return Err(SendError::Clock { byte: index, bit });
            }
        }
    }
    tracing::trace!("Sent {:?}", frame);
    Ok(())
}

pub fn release(link: &mut dyn WireLink) {
    link.release_data();
}
