//! Remote control commands carried over the two-wire link.

pub mod link;
pub mod packet;

use core::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::{
    calendar::DateTime,
    program::{ProgramIndex, SeasonalAdjustment, PROGRAM_COUNT},
    station::STATION_COUNT,
};
use packet::Packet;

pub mod opcode {
    pub const START_PROGRAM: u8 = 0xA0;
    pub const START_STATIONS: u8 = 0xA1;
    pub const STOP_ALL: u8 = 0xA2;
    pub const SEASONAL_ADJUSTMENT: u8 = 0xA3;
    pub const SET_DATE_TIME: u8 = 0xA4;
    pub const PREPARE_RESET: u8 = 0xB0;
    pub const UNIT_INFO: u8 = 0xB1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    StartProgram(ProgramIndex),
    /// Run time (minutes) per station, missing stations are zero
    StartStations([u8; STATION_COUNT]),
    StopAll,
    SeasonalAdjustment(u8),
    /// Binary date and time, seconds are kept
    SetDateTime { year: u8, month: u8, day: u8, hours: u8, minutes: u8 },
    PrepareReset,
    UnitInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    UnknownOpcode(u8),
    Length { opcode: u8, len: usize },
    Argument { opcode: u8, value: u8 },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommandError::UnknownOpcode(opcode) => write!(f, "Unknown opcode {:#04x}", opcode),
            CommandError::Length { opcode, len } => write!(f, "Invalid payload length {} for opcode {:#04x}", len, opcode),
            CommandError::Argument { opcode, value } => write!(f, "Argument {} out of range for opcode {:#04x}", value, opcode),
        }
    }
}

impl std::error::Error for CommandError {}

fn expect_len(opcode: u8, args: &[u8], len: usize) -> Result<(), CommandError> {
    if args.len() != len {
        return Err(CommandError::Length { opcode, len: args.len() + 1 });
    }
    Ok(())
}

fn check_range(opcode: u8, value: u8, range: core::ops::RangeInclusive<u8>) -> Result<u8, CommandError> {
    if !range.contains(&value) {
        return Err(CommandError::Argument { opcode, value });
    }
    Ok(value)
}

impl TryFrom<&Packet> for Command {
    type Error = CommandError;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        // packets are never empty
        let (opcode, args) = match packet.payload().split_first() {
            Some((opcode, args)) => (*opcode, args),
            None => return Err(CommandError::Length { opcode: 0, len: 0 }),
        };

        match opcode {
            opcode::START_PROGRAM => {
                expect_len(opcode, args, 1)?;
                let index = check_range(opcode, args[0], 0..=(PROGRAM_COUNT as u8 - 1))?;
                Ok(Command::StartProgram(usize::from(index)))
            }
            opcode::START_STATIONS => {
                if args.len() > STATION_COUNT {
                    return Err(CommandError::Length { opcode, len: packet.payload().len() });
                }
                let mut minutes = [0u8; STATION_COUNT];
                minutes[..args.len()].copy_from_slice(args);
                Ok(Command::StartStations(minutes))
            }
            opcode::STOP_ALL => {
                expect_len(opcode, args, 0)?;
                Ok(Command::StopAll)
            }
            opcode::SEASONAL_ADJUSTMENT => {
                expect_len(opcode, args, 1)?;
                let tenths = check_range(opcode, args[0], SeasonalAdjustment::MIN..=SeasonalAdjustment::MAX)?;
                Ok(Command::SeasonalAdjustment(tenths))
            }
            opcode::SET_DATE_TIME => {
                expect_len(opcode, args, 5)?;
                Ok(Command::SetDateTime {
                    year: check_range(opcode, args[0], 0..=99)?,
                    month: check_range(opcode, args[1], 1..=12)?,
                    day: check_range(opcode, args[2], 1..=31)?,
                    hours: check_range(opcode, args[3], 0..=23)?,
                    minutes: check_range(opcode, args[4], 0..=59)?,
                })
            }
            opcode::PREPARE_RESET => {
                expect_len(opcode, args, 0)?;
                Ok(Command::PrepareReset)
            }
            opcode::UNIT_INFO => {
                expect_len(opcode, args, 0)?;
                Ok(Command::UnitInfo)
            }
            _ => Err(CommandError::UnknownOpcode(opcode)),
        }
    }
}

/// Reply to [Command::UnitInfo]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitInfo {
    pub now: DateTime,
    pub seasonal_adjustment: SeasonalAdjustment,
    /// Remaining run time per station (seconds)
    pub run_times: [u16; STATION_COUNT],
}

impl UnitInfo {
    pub const SIZE: usize = 6 + 2 * STATION_COUNT;

    /// `[day, month, year, hours, minutes, adjustment, run_time[8] (u16 LE)]`, dates in binary
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..6].copy_from_slice(&[
            self.now.day(),
            self.now.month(),
            self.now.year(),
            self.now.hours(),
            self.now.minutes(),
            self.seasonal_adjustment.tenths(),
        ]);
        LittleEndian::write_u16_into(&self.run_times, &mut bytes[6..]);
        bytes
    }

    pub fn to_packet(&self) -> Result<Packet, packet::FrameError> {
        Packet::new(&self.encode())
    }
}
