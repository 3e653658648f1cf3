//! Control loop scenarios running on simulated hardware

use std::{fs, path::PathBuf, sync::Arc};

use crate::controller::{
    calendar::DateTime,
    clock::Elapsed,
    config::Config,
    controls::Selection,
    demo::{ManualRtc, ScriptedLink, SimulatedButtons, SimulatedRainSensor, SimulatedValves, ValveProbe},
    program::Recurrence,
    remote::packet::Packet,
    station::{ValveBank, MAX_OPEN_STATIONS},
    storage::{FileStorage, MemoryStorage, Storage},
    Controller, Hardware,
};

struct Board {
    probe: ValveProbe,
    rtc: ManualRtc,
    link: ScriptedLink,
    rain: SimulatedRainSensor,
}

fn controller(now: DateTime, storage: Box<dyn Storage>) -> (Controller, Board) {
    let (valves, probe) = SimulatedValves::new();
    let board = Board {
        probe,
        rtc: ManualRtc::new(now),
        link: ScriptedLink::new(),
        rain: SimulatedRainSensor::default(),
    };

    let hardware = Hardware {
        valves: Arc::new(ValveBank::new(Box::new(valves))),
        rtc: Box::new(board.rtc.clone()),
        link: Box::new(board.link.clone()),
        rain_sensor: Box::new(board.rain.clone()),
        buttons: Box::new(SimulatedButtons::default()),
        storage,
    };
    (Controller::new(Config::default(), hardware).unwrap(), board)
}

/// Run one pass per second starting at `second`
fn run_seconds(controller: &mut Controller, second: u8, count: usize) {
    for n in 0..count {
        controller.run_pass(Elapsed {
            seconds: 1,
            second_of_minute: ((usize::from(second) + n) % 60) as u8,
        });
    }
}

struct TempImage(PathBuf);

impl TempImage {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("irrigation-timer-{}-{}.img", name, std::process::id()));
        let _ = fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[test]
fn program_runs_stations_two_at_a_time() {
    let (mut controller, board) = controller(DateTime::new(24, 6, 3, 5, 59, 59), Box::new(MemoryStorage::new()));
    controller.programs.set_start_time(2, 6, 0).unwrap();
    controller.programs.set_run_time(2, 0, 1).unwrap();
    controller.programs.set_run_time(2, 1, 2).unwrap();
    controller.programs.set_run_time(2, 2, 1).unwrap();

    board.rtc.set_now(DateTime::new(24, 6, 3, 6, 0, 0));
    run_seconds(&mut controller, 0, 1);
    assert_eq!(board.probe.station_mask(), 0b001);

    board.rtc.set_now(DateTime::new(24, 6, 3, 6, 1, 0));
    let mut station_3_opened = None;
    for pass in 1..400 {
        run_seconds(&mut controller, (pass % 60) as u8, 1);
        assert!(board.probe.station_mask().count_ones() as usize <= MAX_OPEN_STATIONS);
        if station_3_opened.is_none() && board.probe.is_open(2) {
            station_3_opened = Some(pass);
            assert!(!board.probe.is_open(0), "Station 3 waits for station 1");
            assert!(board.probe.is_open(1));
        }
    }

    assert!(station_3_opened.is_some());
    assert_eq!(board.probe.station_mask(), 0);
    assert!(!board.probe.master_open());
    assert_eq!(controller.stations.progress(), None);
    assert_eq!(controller.selection(), Selection::Run);
}

#[test]
fn rain_cancels_a_running_program() {
    let (mut controller, board) = controller(DateTime::new(24, 6, 3, 6, 0, 0), Box::new(MemoryStorage::new()));
    controller.programs.set_start_time(0, 6, 0).unwrap();
    controller.programs.set_run_time(0, 4, 10).unwrap();

    run_seconds(&mut controller, 0, 10);
    assert!(board.probe.is_open(4));

    board.rain.set_raining(true);
    run_seconds(&mut controller, 10, 10);
    assert_eq!(board.probe.station_mask(), 0);
    assert_eq!(controller.stations.progress(), None);
    assert!(controller.state.rain.is_raining());
}

#[test]
fn remote_program_start_enters_progress() {
    let (mut controller, board) = controller(DateTime::new(24, 6, 3, 14, 30, 0), Box::new(MemoryStorage::new()));
    controller.programs.set_run_time(5, 7, 3).unwrap();

    board.link.request_frame(Packet::new(&[0xA0, 5]).unwrap().to_frame().as_bytes());
    run_seconds(&mut controller, 5, 1);
    assert_eq!(controller.selection(), Selection::Progress);
    assert_eq!(controller.stations.state(7).unwrap().run_time, 180);

    run_seconds(&mut controller, 6, 1);
    assert!(board.probe.is_open(7));

    board.link.request_frame(Packet::new(&[0xA2]).unwrap().to_frame().as_bytes());
    run_seconds(&mut controller, 7, 1);
    run_seconds(&mut controller, 8, 1);
    assert_eq!(board.probe.station_mask(), 0);
    assert_eq!(controller.selection(), Selection::Run, "Progress ends with the last station");
}

#[test]
fn programs_survive_restart() {
    let image = TempImage::new("restart");
    let now = DateTime::new(24, 3, 15, 8, 0, 0);

    {
        let storage = FileStorage::open(image.0.clone()).unwrap();
        let (mut controller, board) = controller(now, Box::new(storage));
        controller.programs.set_start_time(1, 21, 15).unwrap();
        controller.programs.set_run_time(1, 3, 45).unwrap();
        controller.programs.set_interval_period(1, 3, &now).unwrap();

        board.link.request_frame(Packet::new(&[0xA3, 12]).unwrap().to_frame().as_bytes());
        run_seconds(&mut controller, 1, 1);
        assert!(controller.programs.is_dirty(), "Saved on the next pass");
        run_seconds(&mut controller, 2, 1);
        assert!(!controller.programs.is_dirty());
        controller.shutdown();
    }

    let storage = FileStorage::open(image.0.clone()).unwrap();
    let (controller, _) = controller(now, Box::new(storage));
    let program = controller.programs.program(1).unwrap();
    assert_eq!(program.start_time.hour(), Some(21));
    assert_eq!(program.start_time.minute(), 15);
    assert_eq!(program.run_times[3], 45);
    assert!(matches!(program.recurrence, Recurrence::Interval { period: 3, .. }));
    assert_eq!(controller.programs.seasonal_adjustment().tenths(), 12);
    assert!(!controller.programs.program(0).unwrap().start_time.is_enabled());
}
