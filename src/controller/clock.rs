use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{Datelike, Local, NaiveDate, Timelike};

use super::calendar::DateTime;

pub const TICKS_PER_SECOND: u8 = 8;

/// Nominal tick period
pub const TICK_INTERVAL: Duration = Duration::from_millis(125);

const LAST_TICK: u8 = TICKS_PER_SECOND - 1;

/// Fraction and seconds counters.
///
/// Written by the tick source only, read by the control loop.
#[derive(Debug, Default)]
pub struct TickCounter {
    fractions: AtomicU8,
    seconds: AtomicU8,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            fractions: AtomicU8::new(0),
            seconds: AtomicU8::new(0),
        }
    }

    /// Periodic tick. The last tick of a minute is left to [Self::minute_alarm].
    pub fn tick(&self) {
        let seconds = self.seconds.load(Ordering::Acquire);
        let fractions = self.fractions.load(Ordering::Acquire);
        if seconds >= 59 && fractions == LAST_TICK {
            return;
        }

        let fractions = (fractions + 1) % TICKS_PER_SECOND;
        if fractions == 0 {
            self.seconds.store(seconds + 1, Ordering::Release);
        }
        self.fractions.store(fractions, Ordering::Release);
    }

    /// RTC minute alarm
    pub fn minute_alarm(&self) {
        self.seconds.store(0, Ordering::Release);
        self.fractions.store(0, Ordering::Release);
    }

    /// Align the seconds counter with the RTC, used once at boot
    pub fn synchronize(&self, seconds: u8) {
        self.seconds.store(seconds.min(59), Ordering::Release);
        self.fractions.store(0, Ordering::Release);
    }

    pub fn fractions(&self) -> u8 {
        self.fractions.load(Ordering::Acquire)
    }

    pub fn seconds(&self) -> u8 {
        self.seconds.load(Ordering::Acquire)
    }
}

/// Seconds between two readings of the 0-59 seconds counter
pub fn elapsed_seconds(new: u8, last: u8) -> u8 {
    if new < last {
        return (new + 60) - last;
    }
    new - last
}

/// Result of one control loop wake-up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Elapsed {
    /// Whole seconds since the previous pass
    pub seconds: u16,
    /// Seconds counter at this pass
    pub second_of_minute: u8,
}

impl Elapsed {
    pub fn is_new_second(&self) -> bool {
        self.seconds > 0
    }

    /// First pass of a new minute
    pub fn minute_boundary(&self) -> bool {
        self.at_second(0)
    }

    /// First pass of the given second of the minute
    pub fn at_second(&self, second: u8) -> bool {
        self.is_new_second() && self.second_of_minute == second
    }
}

/// Control loop view on the tick counters
pub struct TimeBase {
    counter: Arc<TickCounter>,
    last_fractions: u8,
    last_seconds: u8,
}

impl TimeBase {
    pub fn new(counter: Arc<TickCounter>) -> Self {
        Self {
            last_fractions: counter.fractions(),
            last_seconds: counter.seconds(),
            counter,
        }
    }

    pub fn counter(&self) -> &Arc<TickCounter> {
        &self.counter
    }

    /// Wait up to `timeout` for the next tick.
    ///
    /// Returns [None] if the tick source did not advance in time.
    pub fn wait_tick(&mut self, timeout: Duration) -> Option<Elapsed> {
        let deadline = Instant::now() + timeout;
        loop {
            let fractions = self.counter.fractions();
            if fractions != self.last_fractions {
                self.last_fractions = fractions;
                return Some(self.elapsed());
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn elapsed(&mut self) -> Elapsed {
        let seconds = self.counter.seconds();
        let elapsed = elapsed_seconds(seconds, self.last_seconds);
        self.last_seconds = seconds;
        Elapsed {
            seconds: u16::from(elapsed),
            second_of_minute: seconds,
        }
    }
}

/// Battery backed real time clock
pub trait Rtc: Send {
    fn now(&self) -> DateTime;

    /// Set date and time. With `keep_seconds` the running seconds are left untouched.
    fn set(&mut self, date: &DateTime, keep_seconds: bool);
}

/// Host wall clock (local time) plus an offset in seconds.
///
/// Setting the clock only moves the offset, so no privileges are needed. Clones share
/// the offset.
#[derive(Clone, Debug, Default)]
pub struct SystemRtc {
    offset: Arc<AtomicI64>,
}

impl SystemRtc {
    pub fn new(offset: i64) -> Self {
        Self {
            offset: Arc::new(AtomicI64::new(offset)),
        }
    }

    /// Offset from the host clock (seconds)
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }

    fn local(&self) -> chrono::NaiveDateTime {
        Local::now().naive_local() + chrono::Duration::seconds(self.offset())
    }
}

impl Rtc for SystemRtc {
    fn now(&self) -> DateTime {
        let now = self.local();
        // RTC years are 2000-2099
        let year = (now.year() - 2000).clamp(0, 99) as u8;
        DateTime::new(
            year,
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        )
    }

    fn set(&mut self, date: &DateTime, keep_seconds: bool) {
        let current = self.local();
        let current = current.with_nanosecond(0).unwrap_or(current);
        let seconds = match keep_seconds {
            true => current.second(),
            false => u32::from(date.seconds()),
        };

        let target = NaiveDate::from_ymd_opt(2000 + i32::from(date.year()), u32::from(date.month()), u32::from(date.day()))
            .and_then(|day| day.and_hms_opt(u32::from(date.hours()), u32::from(date.minutes()), seconds));

        match target {
            Some(target) => {
                // whole seconds on both sides, the running second is not shifted
                let offset = self.offset() + (target - current).num_seconds();
                self.offset.store(offset, Ordering::SeqCst);
                tracing::info!("Clock set to {} (offset {}s)", target, offset);
            }
            None => tracing::error!("Cannot set clock to {}", date),
        }
    }
}

/// Raises the minute alarm when the RTC seconds wrap around.
///
/// Setting the clock with the seconds kept never wraps them, so the counters keep
/// running undisturbed.
#[derive(Debug, Default)]
pub struct MinuteAlarm {
    last_second: Option<u8>,
}

impl MinuteAlarm {
    pub fn new(second: u8) -> Self {
        Self { last_second: Some(second) }
    }

    /// Feed one RTC seconds reading. Returns [true] when the alarm fires.
    pub fn poll(&mut self, second: u8) -> bool {
        let wrapped = matches!(self.last_second, Some(last) if second < last);
        self.last_second = Some(second);
        wrapped
    }

    /// One tick period: alarm on a wrap, plain tick otherwise
    pub fn step(&mut self, counter: &TickCounter, second: u8) {
        if self.poll(second) {
            counter.minute_alarm();
        } else {
            counter.tick();
        }
    }
}

/// Periodic tick producer and minute alarm.
///
/// `second` reads the RTC seconds.
pub struct TickSource {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TickSource {
    pub fn spawn<F>(counter: Arc<TickCounter>, interval: Duration, mut second: F) -> io::Result<Self>
    where
        F: FnMut() -> u8 + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();

        let handle = thread::Builder::new().name("tick".into()).spawn(move || {
            let mut alarm = MinuteAlarm::new(second());
            let mut deadline = Instant::now();

            while r.load(Ordering::SeqCst) {
                deadline += interval;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    // fell behind, restart the schedule instead of bursting ticks
                    deadline = now;
                }

                alarm.step(&counter, second());
            }
        })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Tick source panicked");
            }
        }
    }
}

impl Drop for TickSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_seconds_wraps() {
        assert_eq!(elapsed_seconds(10, 10), 0);
        assert_eq!(elapsed_seconds(11, 10), 1);
        assert_eq!(elapsed_seconds(0, 59), 1, "Minute rollover");
        assert_eq!(elapsed_seconds(2, 58), 4);
        assert_eq!(elapsed_seconds(59, 0), 59);
    }

    #[test]
    fn eight_ticks_per_second() {
        let counter = TickCounter::new();
        for _ in 0..7 {
            counter.tick();
        }
        assert_eq!((counter.seconds(), counter.fractions()), (0, 7));

        counter.tick();
        assert_eq!((counter.seconds(), counter.fractions()), (1, 0));
    }

    #[test]
    fn last_tick_of_minute_belongs_to_alarm() {
        let counter = TickCounter::new();
        counter.synchronize(59);
        for _ in 0..20 {
            counter.tick();
        }
        assert_eq!((counter.seconds(), counter.fractions()), (59, 7), "Counters hold until the alarm");

        counter.minute_alarm();
        assert_eq!((counter.seconds(), counter.fractions()), (0, 0));
    }

    #[test]
    fn time_base_reports_ticks() {
        let counter = Arc::new(TickCounter::new());
        counter.synchronize(30);
        let mut time_base = TimeBase::new(counter.clone());

        assert_eq!(time_base.wait_tick(Duration::from_millis(5)), None, "No tick, stalled source");

        counter.tick();
        let elapsed = time_base.wait_tick(Duration::from_millis(5)).unwrap();
        assert_eq!(elapsed, Elapsed { seconds: 0, second_of_minute: 30 });
        assert!(!elapsed.is_new_second());

        for _ in 0..7 {
            counter.tick();
        }
        let elapsed = time_base.wait_tick(Duration::from_millis(5)).unwrap();
        assert_eq!(elapsed, Elapsed { seconds: 1, second_of_minute: 31 });
        assert!(elapsed.at_second(31));
        assert!(!elapsed.minute_boundary());

        counter.synchronize(59);
        counter.tick();
        time_base.wait_tick(Duration::from_millis(5)).unwrap();
        counter.minute_alarm();
        let elapsed = time_base.wait_tick(Duration::from_millis(5)).unwrap();
        assert_eq!(elapsed.seconds, 1);
        assert!(elapsed.minute_boundary());
    }

    #[test]
    fn tick_source_drives_counter() {
        let counter = Arc::new(TickCounter::new());
        let mut source = TickSource::spawn(counter.clone(), Duration::from_millis(1), || 30).unwrap();
        let mut time_base = TimeBase::new(counter.clone());

        assert!(time_base.wait_tick(Duration::from_millis(500)).is_some());
        source.stop();
    }

    #[test]
    fn system_rtc_set_moves_offset() {
        let mut rtc = SystemRtc::new(0);
        let target = DateTime::new(21, 6, 15, 8, 30, 0);
        rtc.set(&target, false);

        let now = rtc.now();
        assert_eq!((now.year(), now.month(), now.day(), now.hours()), (21, 6, 15, 8));
        assert!(now.minutes() == 30 || now.minutes() == 31);
        assert_ne!(rtc.offset(), 0);

        let shared = rtc.clone();
        assert_eq!(shared.offset(), rtc.offset(), "Clones share the offset");
    }

    #[test]
    fn alarm_fires_on_seconds_wrap_only() {
        let mut alarm = MinuteAlarm::new(58);
        assert!(!alarm.poll(58));
        assert!(!alarm.poll(59));
        assert!(alarm.poll(0));
        assert!(!alarm.poll(0), "Once per wrap");
        assert!(!alarm.poll(1));
        assert!(alarm.poll(0), "A missed zero still wraps");
    }

    /// RTC reading `eighths` tick periods after 10:20:30, shifted by `offset` seconds
    fn rtc_second(eighths: u32, offset: u32) -> u8 {
        ((10 * 3600 + 20 * 60 + 30 + eighths / 8 + offset) % 60) as u8
    }

    #[test]
    fn clock_set_keeps_elapsed_seconds_truthful() {
        let counter = Arc::new(TickCounter::new());
        counter.synchronize(rtc_second(0, 0));
        let mut alarm = MinuteAlarm::new(rtc_second(0, 0));
        let mut time_base = TimeBase::new(counter.clone());

        let mut offset = 0;
        let mut credited = 0u32;
        let mut boundaries = Vec::new();
        for eighth in 1..=320 {
            if eighth == 80 {
                // 18:45, seconds kept
                offset += 8 * 3600 + 25 * 60;
            }
            alarm.step(&counter, rtc_second(eighth, offset));

            let elapsed = time_base.wait_tick(Duration::ZERO).unwrap();
            credited += u32::from(elapsed.seconds);
            if elapsed.minute_boundary() {
                boundaries.push(eighth);
            }
        }

        assert_eq!(credited, 40, "One credited second per real second");
        assert_eq!(boundaries, vec![240], "Only the real minute rollover");
    }

    #[test]
    fn system_rtc_set_with_running_tick_source() {
        let mut rtc = SystemRtc::new(0);
        let counter = Arc::new(TickCounter::new());
        counter.synchronize(rtc.now().seconds());

        let reader = rtc.clone();
        let mut source = TickSource::spawn(counter.clone(), TICK_INTERVAL, move || reader.now().seconds()).unwrap();
        let mut time_base = TimeBase::new(counter);
        for _ in 0..4 {
            time_base.wait_tick(Duration::from_millis(500)).unwrap();
        }

        let before = rtc.now();
        let mut date = before;
        date.set_time((before.hours() + 8) % 24, (before.minutes() + 25) % 60, 0);
        rtc.set(&date, true);
        let after = rtc.now();
        assert_eq!(after.minutes(), date.minutes());
        assert!(elapsed_seconds(after.seconds(), before.seconds()) <= 1, "Seconds kept");

        let mut credited = 0;
        let mut boundaries = 0;
        for _ in 0..TICKS_PER_SECOND {
            let elapsed = time_base.wait_tick(Duration::from_millis(500)).unwrap();
            credited += elapsed.seconds;
            boundaries += usize::from(elapsed.minute_boundary());
        }
        source.stop();

        assert!(credited <= 2, "Credited {} seconds for one real second", credited);
        assert!(boundaries <= 1);
    }
}
