//! Calendar arithmetic on packed-decimal dates.
//!
//! The RTC keeps every field as two BCD digits. All arithmetic here unpacks to binary
//! first and only uses integer math.
//!
//! Years are relative to 2000 and every year divisible by four is a leap year. This
//! holds for 2000-2099, which is the whole range of a two digit RTC year.

use core::fmt;

/// Days per month in a common year
const MONTH_DAYS: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Weekday (Sunday = 0) of January 1st for the years 2000-2027.
///
/// The leap year pattern and the 7-day week realign every 28 years, so the table
/// repeats after that.
const FIRST_WEEKDAY: [u8; 28] = [6, 1, 2, 3, 4, 6, 0, 1, 2, 4, 5, 6, 0, 2, 3, 4, 5, 0, 1, 2, 3, 5, 6, 0, 1, 3, 4, 5];

pub const SUNDAY: u8 = 0;
pub const SATURDAY: u8 = 6;

/// Convert a binary number (0-99) into two packed decimal digits
pub const fn decimal_pack(number: u8) -> u8 {
    let tens = number / 10;
    (tens << 4) + (number - tens * 10)
}

/// Convert two packed decimal digits into a binary number
pub const fn decimal_unpack(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

pub const fn is_leap_year(year: u8) -> bool {
    year % 4 == 0
}

/// Number of days in `month` (1-12) of `year` (0-99)
pub fn days_in_month(month: u8, year: u8) -> u8 {
    let month = month.clamp(1, 12);
    if month == 2 && is_leap_year(year) {
        return 29;
    }
    MONTH_DAYS[usize::from(month - 1)]
}

/// Zero-based ordinal of a binary date within its year
pub fn ordinal(year: u8, month: u8, day: u8) -> u16 {
    let month = month.clamp(1, 12);
    let mut days = u16::from(day.max(1) - 1);
    for days_of_month in MONTH_DAYS.iter().take(usize::from(month - 1)) {
        days += u16::from(*days_of_month);
    }
    if month >= 3 && is_leap_year(year) {
        days += 1;
    }
    days
}

/// Zero-based day of the year (0-365)
pub fn day_of_year(date: &DateTime) -> u16 {
    ordinal(date.year(), date.month(), date.day())
}

/// Day of the week (Sunday = 0) computed from the date fields
pub fn weekday(date: &DateTime) -> u8 {
    let first = FIRST_WEEKDAY[usize::from(date.year()) % FIRST_WEEKDAY.len()];
    ((u16::from(first) + day_of_year(date)) % 7) as u8
}

/// Clamp the date into a valid calendar date and recompute the weekday
pub fn fix(date: &mut DateTime) {
    let month = date.month().clamp(1, 12);
    let day = date.day().clamp(1, days_in_month(month, date.year()));
    date.month = decimal_pack(month);
    date.day = decimal_pack(day);
    date.weekday = weekday(date);
}

/// Date and time as kept by the RTC, every field in packed decimal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime {
    year: u8,
    month: u8,
    day: u8,
    weekday: u8,
    hours: u8,
    minutes: u8,
    seconds: u8,
}

impl DateTime {
    /// Build a date from binary fields. The result is always valid: out of range
    /// fields are clamped and the weekday is derived.
    pub fn new(year: u8, month: u8, day: u8, hours: u8, minutes: u8, seconds: u8) -> Self {
        let mut date = Self {
            year: decimal_pack(year.min(99)),
            month: decimal_pack(month.min(99)),
            day: decimal_pack(day.min(99)),
            weekday: 0,
            hours: decimal_pack(hours.min(23)),
            minutes: decimal_pack(minutes.min(59)),
            seconds: decimal_pack(seconds.min(59)),
        };
        fix(&mut date);
        date
    }

    /// Build from RTC registers `[year, month, day, weekday, hours, minutes, seconds]`.
    ///
    /// The weekday register is ignored and recomputed.
    pub fn from_registers(registers: [u8; 7]) -> Self {
        let [year, month, day, _, hours, minutes, seconds] = registers.map(decimal_unpack);
        Self::new(year, month, day, hours, minutes, seconds)
    }

    pub fn registers(&self) -> [u8; 7] {
        [self.year, self.month, self.day, self.weekday, self.hours, self.minutes, self.seconds]
    }

    pub fn year(&self) -> u8 {
        decimal_unpack(self.year)
    }

    pub fn month(&self) -> u8 {
        decimal_unpack(self.month)
    }

    pub fn day(&self) -> u8 {
        decimal_unpack(self.day)
    }

    pub fn weekday(&self) -> u8 {
        self.weekday
    }

    pub fn hours(&self) -> u8 {
        decimal_unpack(self.hours)
    }

    pub fn minutes(&self) -> u8 {
        decimal_unpack(self.minutes)
    }

    pub fn seconds(&self) -> u8 {
        decimal_unpack(self.seconds)
    }

    pub fn set_date(&mut self, year: u8, month: u8, day: u8) {
        self.year = decimal_pack(year.min(99));
        self.month = decimal_pack(month.min(99));
        self.day = decimal_pack(day.min(99));
        fix(self);
    }

    pub fn set_time(&mut self, hours: u8, minutes: u8, seconds: u8) {
        self.hours = decimal_pack(hours.min(23));
        self.minutes = decimal_pack(minutes.min(59));
        self.seconds = decimal_pack(seconds.min(59));
    }

    /// Minutes since midnight
    pub fn minute_of_day(&self) -> u16 {
        u16::from(self.hours()) * 60 + u16::from(self.minutes())
    }
}

impl Default for DateTime {
    /// 2021-01-01 12:00:00, used when the RTC was not running
    fn default() -> Self {
        Self::new(21, 1, 1, 12, 0, 0)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "20{:02}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}
