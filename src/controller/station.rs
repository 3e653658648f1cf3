use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use crate::utils;

/// Stations/Zones on the controller board
pub const STATION_COUNT: usize = 8;

/// Maximum number of valves energized at the same time (overall current draw)
pub const MAX_OPEN_STATIONS: usize = 2;

pub type StationIndex = usize;

/// Output stage that energizes valve solenoids
pub trait ValveDriver: Send {
    fn set_station(&mut self, station: StationIndex, open: bool);

    /// Master valve. This controller keeps it closed at all times.
    fn set_master(&mut self, open: bool);

    fn close_stations(&mut self) {
        for station in 0..STATION_COUNT {
            self.set_station(station, false);
        }
    }
}

/// Valve outputs plus the sticky overcurrent fault latch.
///
/// Shared between the control loop and the overcurrent detector. Opening a valve and
/// tripping the fault take the same lock, so a valve can never be opened after the
/// fault handler has run.
pub struct ValveBank {
    driver: Mutex<Box<dyn ValveDriver>>,
    fault: AtomicBool,
}

impl ValveBank {
    pub fn new(mut driver: Box<dyn ValveDriver>) -> Self {
        driver.set_master(false);
        driver.close_stations();

        Self {
            driver: Mutex::new(driver),
            fault: AtomicBool::new(false),
        }
    }

    fn driver(&self) -> MutexGuard<'_, Box<dyn ValveDriver>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Energize a station valve. Returns [false] (and leaves the valve closed) while the
    /// overcurrent fault is latched.
    pub fn open(&self, station: StationIndex) -> bool {
        let mut driver = self.driver();
        if self.is_faulted() {
            return false;
        }
        driver.set_station(station, true);
        true
    }

    pub fn close(&self, station: StationIndex) {
        self.driver().set_station(station, false);
    }

    pub fn close_all(&self) {
        self.driver().close_stations();
    }

    /// Overcurrent handler
    ///
    /// Closes every output including the master valve and latches the fault.
    pub fn overcurrent_detected(&self) {
        let mut driver = self.driver();
        driver.set_master(false);
        driver.close_stations();
        self.fault.store(true, Ordering::SeqCst);
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.load(Ordering::SeqCst)
    }

    /// Clear the fault latch. Returns [true] if a fault was latched.
    pub fn acknowledge_fault(&self) -> bool {
        self.fault.swap(false, Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StationState {
    /// Remaining requested run time (seconds)
    pub run_time: u16,
    /// The valve is energized
    pub open: bool,
}

impl StationState {
    pub fn is_idle(&self) -> bool {
        self.run_time == 0 && !self.open
    }

    /// Waiting for a free slot to open
    pub fn is_queued(&self) -> bool {
        self.run_time > 0 && !self.open
    }
}

/// Per-station run time queue
pub struct StationQueue {
    states: [StationState; STATION_COUNT],
    valves: Arc<ValveBank>,
}

impl StationQueue {
    pub fn new(valves: Arc<ValveBank>) -> Self {
        Self {
            states: [StationState::default(); STATION_COUNT],
            valves,
        }
    }

    pub fn valves(&self) -> &Arc<ValveBank> {
        &self.valves
    }

    pub fn states(&self) -> &[StationState; STATION_COUNT] {
        &self.states
    }

    pub fn state(&self, station: StationIndex) -> Option<StationState> {
        self.states.get(station).copied()
    }

    /// Request a station to run for `run_time` seconds.
    ///
    /// A request never shortens a queued or running station. Returns [true] if the
    /// stored run time was raised.
    pub fn queue_start(&mut self, station: StationIndex, run_time: u16) -> bool {
        let state = match self.states.get_mut(station) {
            Some(state) => state,
            None => return false,
        };

        if state.run_time >= run_time {
            return false;
        }

        state.run_time = run_time;
        true
    }

    /// Drop all requested run times. Open valves are closed on the next [Self::update].
    pub fn queue_stop_all(&mut self) {
        for state in self.states.iter_mut() {
            state.run_time = 0;
        }
    }

    /// Advance station timers by `elapsed_seconds`, close expired stations and open the
    /// next queued one.
    ///
    /// Only one station is opened per call so in-rush currents never overlap.
    pub fn update(&mut self, elapsed_seconds: u16) {
        if self.valves.is_faulted() {
            // outputs were already forced off by the fault handler
            for (station, state) in self.states.iter_mut().enumerate().filter(|(_, s)| s.open) {
                tracing::warn!("Station {} stopped by overcurrent fault", station + 1);
                state.open = false;
                state.run_time = 0;
            }
            return;
        }

        let mut open_count = 0;
        for (station, state) in self.states.iter_mut().enumerate().filter(|(_, s)| s.open) {
            if state.run_time <= elapsed_seconds {
                state.run_time = 0;
                state.open = false;
                self.valves.close(station);
                tracing::debug!("Station {} closed", station + 1);
                continue;
            }

            state.run_time -= elapsed_seconds;
            open_count += 1;
        }

        if open_count >= MAX_OPEN_STATIONS {
            return;
        }

        if let Some((station, state)) = self.states.iter_mut().enumerate().find(|(_, s)| s.is_queued()) {
            if self.valves.open(station) {
                state.open = true;
                tracing::info!("Station {} open for {}", station + 1, utils::duration_to_hms(state.run_time));
            }
        }
    }

    /// Remaining run time of the first open or queued station
    pub fn progress(&self) -> Option<u16> {
        self.states.iter().find(|s| s.run_time > 0 || s.open).map(|s| s.run_time)
    }

    /// Bit mask of open stations (bit 0 = station 1)
    pub fn mask(&self) -> u8 {
        if self.valves.is_faulted() {
            return 0;
        }

        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.open)
            .fold(0, |mask, (station, _)| mask | (1 << station))
    }

    pub fn open_count(&self) -> usize {
        self.states.iter().filter(|s| s.open).count()
    }

    /// Close every valve immediately and idle all stations
    pub fn close_all(&mut self) {
        self.valves.close_all();
        self.states = [StationState::default(); STATION_COUNT];
    }
}
