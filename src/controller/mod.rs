pub mod calendar;
pub mod clock;
pub mod config;
pub mod controls;
pub mod demo;
pub mod errors;
#[cfg(feature = "station-gpio")]
pub mod gpio;
pub mod program;
pub mod remote;
#[cfg(test)]
mod scenarios;
pub mod scheduler;
pub mod sensor;
pub mod state;
pub mod station;
pub mod storage;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::utils;

use self::{
    calendar::DateTime,
    clock::{Elapsed, Rtc, TimeBase},
    controls::{Buttons, Selection},
    remote::{
        link::{self, WireLink},
        Command, UnitInfo,
    },
    scheduler::ProgramTable,
    sensor::RainSensor,
    station::{StationQueue, ValveBank, STATION_COUNT},
    storage::Storage,
};

pub const FIRMWARE_VERSION: u16 = 100;

/// Longest wait for a tick before the pass runs anyway
pub const TICK_TIMEOUT: Duration = Duration::from_millis(500);

/// Peripherals the controller runs on
pub struct Hardware {
    pub valves: Arc<ValveBank>,
    pub rtc: Box<dyn Rtc>,
    pub link: Box<dyn WireLink>,
    pub rain_sensor: Box<dyn RainSensor>,
    pub buttons: Box<dyn Buttons>,
    pub storage: Box<dyn Storage>,
}

pub struct Controller {
    pub config: config::Config,
    pub state: state::ControllerState,
    pub programs: ProgramTable,
    pub stations: StationQueue,
    rtc: Box<dyn Rtc>,
    link: Box<dyn WireLink>,
    rain_sensor: Box<dyn RainSensor>,
    buttons: Box<dyn Buttons>,
    storage: Box<dyn Storage>,
}

impl Controller {
    /// Restore programs from storage and start with every station idle
    pub fn new(config: config::Config, hardware: Hardware) -> errors::Result<Self> {
        let Hardware {
            valves,
            rtc,
            link,
            rain_sensor,
            buttons,
            mut storage,
        } = hardware;

        let programs = ProgramTable::init(storage.as_mut())?;
        let now = rtc.now();
        tracing::info!("Controller started at {}", now);

        Ok(Self {
            config,
            state: state::ControllerState::new(now),
            programs,
            stations: StationQueue::new(valves),
            rtc,
            link,
            rain_sensor,
            buttons,
            storage,
        })
    }

    pub fn valves(&self) -> &Arc<ValveBank> {
        self.stations.valves()
    }

    pub fn now(&self) -> DateTime {
        self.state.now
    }

    pub fn selection(&self) -> Selection {
        self.state.selection()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.state.set_selection(selection);
    }

    /// Clear a latched overcurrent fault. Returns [true] if one was latched.
    pub fn acknowledge_fault(&mut self) -> bool {
        let acknowledged = self.valves().acknowledge_fault();
        if acknowledged {
            tracing::info!("Overcurrent fault acknowledged");
        }
        acknowledged
    }

    /// Run passes until `running` is cleared
    pub fn run(&mut self, time_base: &mut TimeBase, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let elapsed = match time_base.wait_tick(TICK_TIMEOUT) {
                Some(elapsed) => elapsed,
                None => {
                    tracing::error!("Tick source stalled");
                    Elapsed::default()
                }
            };
            self.run_pass(elapsed);
        }
    }

    /// One control loop pass
    pub fn run_pass(&mut self, elapsed: Elapsed) {
        let input_active = self.buttons.any_pressed();
        if input_active {
            self.acknowledge_fault();
        }

        if elapsed.minute_boundary() {
            self.state.now = self.rtc.now();
            tracing::trace!("Time {}", self.state.now);

            if self.state.selection() == Selection::Run && !self.state.rain.is_raining() {
                self.programs.check(&self.state.now, &mut self.stations);
            }
        }

        if sensor::CHECK_SECONDS.iter().any(|second| elapsed.at_second(*second)) {
            self.check_rain_sensor();
        }

        let mask = self.stations.mask();
        self.stations.update(elapsed.seconds);
        if self.stations.mask() != mask {
            tracing::debug!("Stations {}", utils::station_mask_to_string(self.stations.mask()));
        }

        if self.stations.progress().is_none() {
            self.state.leave_progress();
        }

        if let Err(err) = self.programs.persist_if_settled(self.storage.as_mut(), input_active) {
            tracing::error!("Could not save programs: {}", err);
        }

        self.handle_remote();
    }

    fn check_rain_sensor(&mut self) {
        let sensed = self.rain_sensor.sense();
        if self.state.rain.update(sensed) {
            tracing::info!("Rain detected, stopping all stations");
            self.stations.queue_stop_all();
            self.programs.reset_calendar_offsets(&self.state.now);
        }
    }

    /// Receive and execute one remote command, if the peer is requesting
    pub fn handle_remote(&mut self) {
        let packet = match link::receive(self.link.as_mut()) {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!("Discarded remote frame: {}", err);
                return;
            }
        };

        match Command::try_from(&packet) {
            Ok(command) => self.execute(command),
            Err(err) => tracing::debug!("Ignored remote command: {}", err),
        }
    }

    pub fn execute(&mut self, command: Command) {
        tracing::info!("Remote command {:?}", command);

        match command {
            Command::StartProgram(index) => {
                if self.programs.queue(index, &mut self.stations) {
                    self.state.enter_progress();
                }
            }
            Command::StartStations(minutes) => {
                let mut raised = false;
                for (station, minutes) in minutes.iter().enumerate() {
                    raised |= self.stations.queue_start(station, u16::from(*minutes) * 60);
                }
                if raised {
                    self.state.enter_progress();
                }
            }
            Command::StopAll => self.stations.queue_stop_all(),
            Command::SeasonalAdjustment(tenths) => {
                if let Err(err) = self.programs.set_seasonal_adjustment(tenths) {
                    tracing::debug!("{}", err);
                }
            }
            Command::SetDateTime {
                year,
                month,
                day,
                hours,
                minutes,
            } => {
                let mut date = self.rtc.now();
                date.set_date(year, month, day);
                date.set_time(hours, minutes, date.seconds());
                self.rtc.set(&date, true);
                self.state.now = self.rtc.now();
            }
            Command::PrepareReset => {
                self.stations.close_all();
                thread::sleep(Duration::from_millis(u64::from(self.config.reset_pause_ms)));
                self.reply_unit_info();
            }
            Command::UnitInfo => self.reply_unit_info(),
        }
    }

    pub fn unit_info(&self) -> UnitInfo {
        let mut run_times = [0u16; STATION_COUNT];
        for (run_time, state) in run_times.iter_mut().zip(self.stations.states()) {
            *run_time = state.run_time;
        }

        UnitInfo {
            now: self.state.now,
            seasonal_adjustment: self.programs.seasonal_adjustment(),
            run_times,
        }
    }

    fn reply_unit_info(&mut self) {
        if let Err(err) = link::announce(self.link.as_mut()) {
            tracing::debug!("Reply not accepted: {}", err);
            link::release(self.link.as_mut());
            return;
        }

        match self.unit_info().to_packet() {
            Ok(packet) => {
                if let Err(err) = link::send(self.link.as_mut(), &packet.to_frame()) {
                    tracing::debug!("Reply aborted: {}", err);
                }
            }
            Err(err) => tracing::error!("Cannot frame reply: {}", err),
        }
        link::release(self.link.as_mut());
    }

    /// Close every valve and save pending program changes
    pub fn shutdown(&mut self) {
        self.stations.close_all();
        if let Err(err) = self.programs.persist_if_settled(self.storage.as_mut(), false) {
            tracing::error!("Could not save programs: {}", err);
        }
        tracing::info!("Controller stopped");
    }
}
