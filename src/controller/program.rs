use core::fmt;

use super::{
    calendar::{self, decimal_pack, decimal_unpack, DateTime},
    station::STATION_COUNT,
};

pub const PROGRAM_COUNT: usize = 8;

/// Longest configurable station run time (minutes)
pub const MAX_RUN_MINUTES: u8 = 240;

/// Longest interval between two runs of an interval program (days)
pub const MAX_INTERVAL_DAYS: u8 = 8;

/// Start hour value of a disabled program
const START_HOUR_DISABLED: u8 = 24;

/// Size of one program in non-volatile storage
pub const RECORD_SIZE: usize = 3 + STATION_COUNT;

pub type ProgramIndex = usize;

// Recurrence byte encodings
// 0XXXXXXX - weekday mask
// 10PPPOOO - interval period-1/offset
// 110S0000 - odd/even selector
const WEEKDAYS_MASK: u8 = 0b0111_1111;
const INTERVAL_TAG: u8 = 0b10;
const ODD_EVEN_TAG: u8 = 0b110;
const ODD_EVEN_BIT: u8 = 4;

/// Program start time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartTime {
    hour: u8,
    minute: u8,
}

impl StartTime {
    pub const DISABLED: StartTime = StartTime {
        hour: START_HOUR_DISABLED,
        minute: 0,
    };

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    pub fn is_enabled(&self) -> bool {
        self.hour != START_HOUR_DISABLED
    }

    pub fn hour(&self) -> Option<u8> {
        self.is_enabled().then(|| self.hour)
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Exact hour:minute match
    pub fn matches(&self, now: &DateTime) -> bool {
        self.is_enabled() && self.hour == now.hours() && self.minute == now.minutes()
    }

    /// The start time was earlier today than `now`
    pub fn passed(&self, now: &DateTime) -> bool {
        self.is_enabled() && u16::from(self.hour) * 60 + u16::from(self.minute) < now.minute_of_day()
    }

    fn encode(&self) -> [u8; 2] {
        [decimal_pack(self.hour), decimal_pack(self.minute)]
    }

    fn decode(bytes: [u8; 2]) -> Option<Self> {
        let [hour, minute] = bytes;
        if !is_decimal(hour) || !is_decimal(minute) {
            return None;
        }
        match decimal_unpack(hour) {
            START_HOUR_DISABLED => Some(Self::DISABLED),
            hour => Self::new(hour, decimal_unpack(minute)),
        }
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hour() {
            Some(hour) => write!(f, "{:02}:{:02}", hour, self.minute),
            None => write!(f, "OFF"),
        }
    }
}

fn is_decimal(bcd: u8) -> bool {
    (bcd >> 4) <= 9 && (bcd & 0x0F) <= 9
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Parity {
    Even = 0,
    Odd = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecurrenceKind {
    Weekdays,
    Interval,
    OddEven,
}

/// Day restriction of a program, stored as a single byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recurrence {
    /// Bit `i` set: the program may run on weekday `i` (Sunday = 0)
    Weekdays(u8),
    /// Every `period` days (1-8), on days where `day_of_year % period == offset`
    Interval { period: u8, offset: u8 },
    /// Odd or even days, counting January 1st as day 1
    OddEven(Parity),
    /// `111xxxxx` - not produced by the controller, matches every day. The raw byte is
    /// kept so storage round-trips unchanged.
    Unrestricted(u8),
}

impl Recurrence {
    pub const EVERY_DAY: Recurrence = Recurrence::Weekdays(WEEKDAYS_MASK);

    pub fn interval(period: u8, offset: u8) -> Option<Self> {
        if period == 0 || period > MAX_INTERVAL_DAYS || offset >= MAX_INTERVAL_DAYS {
            return None;
        }
        Some(Recurrence::Interval { period, offset })
    }

    /// Default fields of each variant
    pub fn default_for(kind: RecurrenceKind) -> Self {
        match kind {
            RecurrenceKind::Weekdays => Self::EVERY_DAY,
            RecurrenceKind::Interval => Recurrence::Interval { period: 1, offset: 0 },
            RecurrenceKind::OddEven => Recurrence::OddEven(Parity::Even),
        }
    }

    pub fn kind(&self) -> Option<RecurrenceKind> {
        match self {
            Recurrence::Weekdays(_) => Some(RecurrenceKind::Weekdays),
            Recurrence::Interval { .. } => Some(RecurrenceKind::Interval),
            Recurrence::OddEven(_) => Some(RecurrenceKind::OddEven),
            Recurrence::Unrestricted(_) => None,
        }
    }

    pub fn decode(byte: u8) -> Self {
        if byte >> 7 == 0 {
            Recurrence::Weekdays(byte & WEEKDAYS_MASK)
        } else if byte >> 6 == INTERVAL_TAG {
            Recurrence::Interval {
                period: ((byte >> 3) & 0b111) + 1,
                offset: byte & 0b111,
            }
        } else if byte >> 5 == ODD_EVEN_TAG {
            Recurrence::OddEven(match (byte >> ODD_EVEN_BIT) & 1 {
                0 => Parity::Even,
                _ => Parity::Odd,
            })
        } else {
            Recurrence::Unrestricted(byte)
        }
    }

    pub fn encode(&self) -> u8 {
        match *self {
            Recurrence::Weekdays(mask) => mask & WEEKDAYS_MASK,
            Recurrence::Interval { period, offset } => {
                (INTERVAL_TAG << 6) | ((period.clamp(1, MAX_INTERVAL_DAYS) - 1) << 3) | (offset & 0b111)
            }
            Recurrence::OddEven(parity) => (ODD_EVEN_TAG << 5) | ((parity as u8) << ODD_EVEN_BIT),
            Recurrence::Unrestricted(byte) => byte,
        }
    }

    /// Check the day restriction against a weekday and zero-based day of year
    pub fn matches(&self, weekday: u8, year_day: u16) -> bool {
        match *self {
            Recurrence::Weekdays(mask) => mask & (1 << weekday) != 0,
            Recurrence::Interval { period, offset } => year_day % u16::from(period) == u16::from(offset),
            Recurrence::OddEven(parity) => (year_day + 1) & 1 == parity as u16,
            Recurrence::Unrestricted(_) => true,
        }
    }
}

impl From<u8> for Recurrence {
    fn from(byte: u8) -> Self {
        Recurrence::decode(byte)
    }
}

impl From<Recurrence> for u8 {
    fn from(recurrence: Recurrence) -> Self {
        recurrence.encode()
    }
}

/// Seasonal adjustment in tenths (1 = 10% .. 15 = 150%)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeasonalAdjustment(u8);

impl SeasonalAdjustment {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 15;

    pub fn new(tenths: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&tenths).then(|| Self(tenths))
    }

    pub fn tenths(&self) -> u8 {
        self.0
    }

    /// Scale a run time in minutes to seconds
    pub fn scale(&self, minutes: u8) -> u16 {
        // 60 seconds per minute / 10 base of the adjustment
        u16::from(minutes) * 6 * u16::from(self.0)
    }
}

impl Default for SeasonalAdjustment {
    fn default() -> Self {
        Self(10)
    }
}

impl fmt::Display for SeasonalAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", u16::from(self.0) * 10)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Program {
    pub start_time: StartTime,
    pub recurrence: Recurrence,
    /// Run time per station (minutes)
    pub run_times: [u8; STATION_COUNT],
}

impl Default for Program {
    fn default() -> Self {
        Self {
            start_time: StartTime::DISABLED,
            recurrence: Recurrence::EVERY_DAY,
            run_times: [0; STATION_COUNT],
        }
    }
}

impl Program {
    /// Check if the program should start at `now`
    pub fn is_due(&self, now: &DateTime) -> bool {
        if !self.start_time.matches(now) {
            return false;
        }
        self.recurrence.matches(now.weekday(), calendar::day_of_year(now))
    }

    /// Switch to another recurrence variant, resetting its fields to defaults.
    ///
    /// Selecting the active variant keeps the current fields.
    pub fn switch_recurrence(&mut self, kind: RecurrenceKind) {
        if self.recurrence.kind() != Some(kind) {
            self.recurrence = Recurrence::default_for(kind);
        }
    }

    pub fn has_run_times(&self) -> bool {
        self.run_times.iter().any(|m| *m > 0)
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[..2].copy_from_slice(&self.start_time.encode());
        record[2] = self.recurrence.encode();
        record[3..].copy_from_slice(&self.run_times);
        record
    }

    pub fn decode(record: &[u8; RECORD_SIZE]) -> result::Result<Self> {
        let start_time = StartTime::decode([record[0], record[1]]).ok_or(result::ProgramError::Corrupt)?;

        let mut run_times = [0u8; STATION_COUNT];
        run_times.copy_from_slice(&record[3..]);
        if run_times.iter().any(|m| *m > MAX_RUN_MINUTES) {
            return Err(result::ProgramError::Corrupt);
        }

        Ok(Self {
            start_time,
            recurrence: Recurrence::decode(record[2]),
            run_times,
        })
    }
}

pub mod result {
    use core::fmt;

    pub type Result<T> = std::result::Result<T, ProgramError>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProgramError {
        /// No program with this index
        ProgramIndex(usize),
        /// No station with this index
        StationIndex(usize),
        RunTime(u8),
        StartTime { hour: u8, minute: u8 },
        IntervalPeriod(u8),
        SeasonalAdjustment(u8),
        /// Stored record does not decode
        Corrupt,
    }

    impl fmt::Display for ProgramError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self {
                ProgramError::ProgramIndex(index) => write!(f, "program index out of bounds: {}", index),
                ProgramError::StationIndex(index) => write!(f, "station index out of bounds: {}", index),
                ProgramError::RunTime(minutes) => write!(f, "run time out of range: {} minutes", minutes),
                ProgramError::StartTime { hour, minute } => write!(f, "invalid start time: {}:{}", hour, minute),
                ProgramError::IntervalPeriod(days) => write!(f, "interval period out of range: {} days", days),
                ProgramError::SeasonalAdjustment(tenths) => write!(f, "seasonal adjustment out of range: {}", tenths),
                ProgramError::Corrupt => write!(f, "program record is corrupt"),
            }
        }
    }

    impl std::error::Error for ProgramError {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurrence_bit_layout() {
        assert_eq!(Recurrence::decode(0b0101_0101), Recurrence::Weekdays(0b101_0101));
        assert_eq!(Recurrence::decode(0b1001_0001), Recurrence::Interval { period: 3, offset: 1 });
        assert_eq!(Recurrence::decode(0b1011_1111), Recurrence::Interval { period: 8, offset: 7 });
        assert_eq!(Recurrence::decode(0b1101_0000), Recurrence::OddEven(Parity::Odd));
        assert_eq!(Recurrence::decode(0b1100_0000), Recurrence::OddEven(Parity::Even));
        assert_eq!(Recurrence::decode(0b1100_1010), Recurrence::OddEven(Parity::Even), "Low nibble is unused");
        assert_eq!(Recurrence::decode(0b1110_0110), Recurrence::Unrestricted(0b1110_0110));

        assert_eq!(Recurrence::Interval { period: 3, offset: 1 }.encode(), 0b1001_0001);
        assert_eq!(Recurrence::OddEven(Parity::Odd).encode(), 0b1101_0000);
        assert_eq!(Recurrence::EVERY_DAY.encode(), 0b0111_1111);
        assert_eq!(u8::from(Recurrence::Unrestricted(0xE6)), 0xE6);
    }

    #[test]
    fn recurrence_matching() {
        let weekends = Recurrence::Weekdays(0b100_0001);
        assert!(weekends.matches(calendar::SUNDAY, 0));
        assert!(weekends.matches(calendar::SATURDAY, 0));
        assert!(!weekends.matches(3, 0));

        let odd = Recurrence::OddEven(Parity::Odd);
        let even = Recurrence::OddEven(Parity::Even);
        assert!(odd.matches(0, 0), "January 1st is an odd day");
        assert!(!even.matches(0, 0));
        assert!(even.matches(0, 1));

        assert!(Recurrence::Unrestricted(0xFF).matches(2, 200));
    }

    #[test]
    fn interval_fires_on_period_across_leap_year() {
        let program = Program {
            start_time: StartTime::new(6, 30).unwrap(),
            recurrence: Recurrence::interval(3, 1).unwrap(),
            run_times: [5; STATION_COUNT],
        };

        let mut fired = 0;
        for month in 1..=12 {
            for day in 1..=calendar::days_in_month(month, 24) {
                let now = DateTime::new(24, month, day, 6, 30, 0);
                let year_day = calendar::day_of_year(&now);
                assert_eq!(program.is_due(&now), year_day % 3 == 1, "Testing day {}", year_day);
                if program.is_due(&now) {
                    fired += 1;
                }
                assert!(!program.is_due(&DateTime::new(24, month, day, 6, 31, 0)), "Start time must match exactly");
            }
        }
        assert_eq!(fired, 122);
    }

    #[test]
    fn disabled_program_never_due() {
        let program = Program {
            run_times: [10; STATION_COUNT],
            ..Program::default()
        };
        for hour in 0..24 {
            assert!(!program.is_due(&DateTime::new(21, 6, 1, hour, 0, 0)));
        }
    }

    #[test]
    fn switching_recurrence_resets_fields() {
        let mut program = Program {
            recurrence: Recurrence::Weekdays(0b10),
            ..Program::default()
        };

        program.switch_recurrence(RecurrenceKind::Weekdays);
        assert_eq!(program.recurrence, Recurrence::Weekdays(0b10), "Same variant keeps its fields");

        program.switch_recurrence(RecurrenceKind::Interval);
        assert_eq!(program.recurrence, Recurrence::Interval { period: 1, offset: 0 });

        program.switch_recurrence(RecurrenceKind::OddEven);
        assert_eq!(program.recurrence, Recurrence::OddEven(Parity::Even));

        program.switch_recurrence(RecurrenceKind::Weekdays);
        assert_eq!(program.recurrence, Recurrence::EVERY_DAY);
    }

    #[test]
    fn record_layout() {
        let program = Program {
            start_time: StartTime::new(21, 45).unwrap(),
            recurrence: Recurrence::interval(2, 1).unwrap(),
            run_times: [0, 10, 0, 240, 0, 0, 0, 1],
        };
        let record = program.encode();
        assert_eq!(record, [0x21, 0x45, 0b1000_1001, 0, 10, 0, 240, 0, 0, 0, 1]);
        assert_eq!(Program::decode(&record), Ok(program));

        let disabled = Program::default().encode();
        assert_eq!(&disabled[..3], &[0x24, 0x00, 0x7F]);

        assert_eq!(Program::decode(&[0xFF; RECORD_SIZE]), Err(result::ProgramError::Corrupt), "Erased storage");
        assert_eq!(Program::decode(&[0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), Err(result::ProgramError::Corrupt));
    }

    #[test]
    fn seasonal_adjustment_scaling() {
        assert_eq!(SeasonalAdjustment::new(15).unwrap().scale(10), 900);
        assert_eq!(SeasonalAdjustment::default().scale(10), 600);
        assert_eq!(SeasonalAdjustment::new(1).unwrap().scale(240), 1440);
        assert_eq!(SeasonalAdjustment::new(15).unwrap().scale(240), 21600);
        assert!(SeasonalAdjustment::new(0).is_none());
        assert!(SeasonalAdjustment::new(16).is_none());
        assert_eq!(SeasonalAdjustment::new(7).unwrap().to_string(), "70%");
    }
}
