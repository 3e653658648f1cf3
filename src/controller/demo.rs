//! Simulated peripherals, used in demo mode and by tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use super::{
    calendar::DateTime,
    clock::Rtc,
    controls::Buttons,
    remote::link::WireLink,
    sensor::RainSensor,
    station::{StationIndex, ValveDriver, STATION_COUNT},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ValveOutputs {
    stations: [bool; STATION_COUNT],
    master: bool,
}

/// Valve outputs that only log
pub struct SimulatedValves {
    outputs: Arc<Mutex<ValveOutputs>>,
}

/// Read access to the outputs of [SimulatedValves]
#[derive(Clone)]
pub struct ValveProbe {
    outputs: Arc<Mutex<ValveOutputs>>,
}

impl SimulatedValves {
    pub fn new() -> (SimulatedValves, ValveProbe) {
        let outputs = Arc::new(Mutex::new(ValveOutputs::default()));
        (SimulatedValves { outputs: outputs.clone() }, ValveProbe { outputs })
    }
}

impl ValveDriver for SimulatedValves {
    fn set_station(&mut self, station: StationIndex, open: bool) {
        let mut outputs = lock(&self.outputs);
        if let Some(output) = outputs.stations.get_mut(station) {
            if *output != open {
                tracing::debug!("[DEMO] Valve {} {}", station + 1, if open { "energized" } else { "released" });
            }
            *output = open;
        }
    }

    fn set_master(&mut self, open: bool) {
        lock(&self.outputs).master = open;
    }
}

impl ValveProbe {
    pub fn station_mask(&self) -> u8 {
        lock(&self.outputs)
            .stations
            .iter()
            .enumerate()
            .filter(|(_, open)| **open)
            .fold(0, |mask, (station, _)| mask | (1 << station))
    }

    pub fn is_open(&self, station: StationIndex) -> bool {
        lock(&self.outputs).stations.get(station).copied().unwrap_or(false)
    }

    pub fn master_open(&self) -> bool {
        lock(&self.outputs).master
    }
}

/// Clock that only moves when told to. Clones share the time.
#[derive(Clone, Default)]
pub struct ManualRtc {
    now: Arc<Mutex<DateTime>>,
}

impl ManualRtc {
    pub fn new(now: DateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set_now(&self, now: DateTime) {
        *lock(&self.now) = now;
    }
}

impl Rtc for ManualRtc {
    fn now(&self) -> DateTime {
        *lock(&self.now)
    }

    fn set(&mut self, date: &DateTime, keep_seconds: bool) {
        let mut now = lock(&self.now);
        let seconds = if keep_seconds { now.seconds() } else { date.seconds() };
        *now = *date;
        now.set_time(date.hours(), date.minutes(), seconds);
    }
}

/// Link without a peer
pub struct IdleLink;

impl WireLink for IdleLink {
    fn clock(&mut self) -> bool {
        false
    }

    fn data(&mut self) -> bool {
        false
    }

    fn drive_data(&mut self, _high: bool) {}

    fn release_data(&mut self) {}
}

enum Step {
    Level { clock: bool, data: bool },
    /// Clock stays low until data is driven high
    AwaitAnnounce,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    idle_clock: bool,
    data_in: bool,
    data_out: Option<bool>,
    /// Data levels seen on rising clock edges while the controller drives the wire
    sampled: Vec<bool>,
}

/// Link peer that plays back a script, one step per clock poll.
///
/// Clones share the script, so a copy can be inspected after the link is handed over.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_levels(&self, levels: impl IntoIterator<Item = (bool, bool)>) {
        let mut script = lock(&self.script);
        for (clock, data) in levels {
            script.steps.push_back(Step::Level { clock, data });
        }
    }

    /// Clock level once the script is played back
    pub fn idle_clock(&self, level: bool) {
        lock(&self.script).idle_clock = level;
    }

    /// Request, then clock in raw bits
    pub fn request_bits(&self, bits: &[bool]) {
        self.push_levels([(true, false), (false, false)]);
        self.push_levels(bits.iter().flat_map(|bit| [(true, *bit), (false, *bit)]));
    }

    /// Request, then clock in a frame
    pub fn request_frame(&self, frame: &[u8]) {
        let bits: Vec<bool> = frame
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
            .collect();
        self.request_bits(&bits);
    }

    pub fn await_announce(&self) {
        lock(&self.script).steps.push_back(Step::AwaitAnnounce);
    }

    /// Answer an announcement and clock out `frame_len` bytes
    pub fn accept_reply(&self, frame_len: usize) {
        self.push_levels([(true, false), (false, false)]);
        self.push_levels((0..frame_len * 8).flat_map(|_| [(true, false), (false, false)]));
    }

    pub fn data_out(&self) -> Option<bool> {
        lock(&self.script).data_out
    }

    pub fn is_exhausted(&self) -> bool {
        lock(&self.script).steps.is_empty()
    }

    /// Bytes clocked out after the announcement
    pub fn sent_bytes(&self) -> Vec<u8> {
        let script = lock(&self.script);
        script
            .sampled
            .iter()
            .skip(1)
            .collect::<Vec<_>>()
            .chunks(8)
            .map(|bits| {
                bits.iter()
                    .enumerate()
                    .filter(|(_, bit)| ***bit)
                    .fold(0u8, |byte, (index, _)| byte | (1 << index))
            })
            .collect()
    }
}

impl WireLink for ScriptedLink {
    fn clock(&mut self) -> bool {
        let mut guard = lock(&self.script);
        let script = &mut *guard;
        match script.steps.pop_front() {
            Some(Step::Level { clock, data }) => {
                script.data_in = data;
                if clock {
                    if let Some(level) = script.data_out {
                        script.sampled.push(level);
                    }
                }
                clock
            }
            Some(Step::AwaitAnnounce) => {
                script.steps.push_front(Step::AwaitAnnounce);
                false
            }
            None => script.idle_clock,
        }
    }

    fn data(&mut self) -> bool {
        lock(&self.script).data_in
    }

    fn drive_data(&mut self, high: bool) {
        let mut script = lock(&self.script);
        script.data_out = Some(high);
        if high && matches!(script.steps.front(), Some(Step::AwaitAnnounce)) {
            script.steps.pop_front();
        }
    }

    fn release_data(&mut self) {
        lock(&self.script).data_out = None;
    }
}

/// Rain sensor switched by hand. Clones share the level.
#[derive(Clone, Default)]
pub struct SimulatedRainSensor {
    raining: Arc<AtomicBool>,
}

impl SimulatedRainSensor {
    pub fn set_raining(&self, raining: bool) {
        self.raining.store(raining, Ordering::SeqCst);
    }
}

impl RainSensor for SimulatedRainSensor {
    fn sense(&mut self) -> bool {
        self.raining.load(Ordering::SeqCst)
    }
}

/// Buttons pressed by hand. Clones share the level.
#[derive(Clone, Default)]
pub struct SimulatedButtons {
    pressed: Arc<AtomicBool>,
}

impl SimulatedButtons {
    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::SeqCst);
    }
}

impl Buttons for SimulatedButtons {
    fn any_pressed(&mut self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}
