use clap::Parser;
use std::{
    any::Any,
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing_subscriber::FmtSubscriber;

#[cfg(all(feature = "station-gpio", not(feature = "demo")))]
use irrigation_timer::controller::gpio;
use irrigation_timer::controller::{
    clock::{Rtc, SystemRtc, TickCounter, TickSource, TimeBase},
    config,
    controls::Selection,
    demo, errors,
    station::ValveBank,
    storage::FileStorage,
    Controller, Hardware, FIRMWARE_VERSION,
};

include!(concat!(env!("OUT_DIR"), "/firmware_banner.rs"));

#[cfg(unix)]
const CONFIG_FILE_PATH: &'static str = "/etc/opt/irrigation-timer.dat";

#[cfg(not(unix))]
const CONFIG_FILE_PATH: &'static str = "./irrigation-timer.dat";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Binary config file path
    #[clap(short = 'c', long = "config", default_value = CONFIG_FILE_PATH, parse(from_os_str))]
    config: std::path::PathBuf,

    /// Set a config value
    #[clap(long = "set", takes_value = true, required = false, min_values = 2, max_values = 2)]
    set: Option<Vec<String>>,

    // List config values
    #[clap(long = "list", takes_value = false)]
    list: bool,

    // Reset all config values
    #[clap(long = "reset", takes_value = false)]
    reset: bool,

    /// Log everything
    #[clap(short = 'v', long = "verbose", takes_value = false)]
    verbose: bool,

    /// Start with automatic programs switched off
    #[clap(long = "off", takes_value = false)]
    off: bool,
}

fn setup_tracing(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {}", err);
    }
}

/// Read the config file, falling back to defaults when it is missing or outdated
fn load_config(path: std::path::PathBuf) -> config::Config {
    let defaults = config::Config::new(path);
    if !defaults.exists() {
        return defaults;
    }

    match defaults.read() {
        Ok(config) if config.firmware_version >= FIRMWARE_VERSION => config,
        Ok(config) => {
            eprintln!("Ignoring config for firmware version {}", config.firmware_version);
            defaults
        }
        Err(err) => {
            eprintln!("Cannot read config: {}", err);
            defaults
        }
    }
}

fn simulated_hardware(rtc: SystemRtc, storage: FileStorage) -> Hardware {
    let (valves, _) = demo::SimulatedValves::new();
    Hardware {
        valves: Arc::new(ValveBank::new(Box::new(valves))),
        rtc: Box::new(rtc),
        link: Box::new(demo::IdleLink),
        rain_sensor: Box::new(demo::SimulatedRainSensor::default()),
        buttons: Box::new(demo::SimulatedButtons::default()),
        storage: Box::new(storage),
    }
}

/// Select the board peripherals. The second value keeps interrupt handlers registered.
fn hardware(config: &config::Config, rtc: SystemRtc, storage: FileStorage) -> errors::Result<(Hardware, Option<Box<dyn Any>>)> {
    #[cfg(all(feature = "station-gpio", not(feature = "demo")))]
    match gpio::Peripherals::new(config) {
        Ok(peripherals) => {
            let valves = Arc::new(ValveBank::new(Box::new(peripherals.valves)));
            let mut overcurrent = peripherals.overcurrent;
            overcurrent.arm(valves.clone())?;
            if overcurrent.is_active() {
                valves.overcurrent_detected();
                tracing::error!("Overcurrent input active at startup");
            }

            let hardware = Hardware {
                valves,
                rtc: Box::new(rtc),
                link: Box::new(peripherals.link),
                rain_sensor: Box::new(peripherals.rain_sensor),
                buttons: Box::new(peripherals.button),
                storage: Box::new(storage),
            };
            return Ok((hardware, Some(Box::new(overcurrent))));
        }
        Err(ref error) => tracing::error!("Cannot access GPIO peripheral: {:?}", error),
    }

    #[cfg(any(not(feature = "station-gpio"), feature = "demo"))]
    let _ = config;

    tracing::info!("DEMO MODE");
    Ok((simulated_hardware(rtc, storage), None))
}

fn run(config: config::Config, off: bool, running: Arc<AtomicBool>) -> errors::Result<()> {
    let rtc = SystemRtc::new(config.rtc_offset);
    let storage = FileStorage::open(config.storage_path.clone())?;
    let tick_interval = Duration::from_millis(u64::from(config.tick_interval_ms.max(1)));

    let (hardware, _interrupts) = hardware(&config, rtc.clone(), storage)?;
    let mut controller = Controller::new(config, hardware)?;
    if off {
        controller.set_selection(Selection::Off);
    }

    // region: TIME BASE
    let counter = Arc::new(TickCounter::new());
    counter.synchronize(rtc.now().seconds());
    let second_rtc = rtc.clone();
    let mut tick_source = TickSource::spawn(counter.clone(), tick_interval, move || second_rtc.now().seconds())?;
    let mut time_base = TimeBase::new(counter);
    // endregion TIME BASE

    controller.run(&mut time_base, &running);

    tick_source.stop();
    controller.shutdown();

    controller.config.rtc_offset = rtc.offset();
    controller.config.write()?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    // region: SIGNALS
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(err) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl-C handler: {}", err);
        process::exit(1);
    }
    // endregion SIGNALS

    let mut config = load_config(args.config);

    if args.reset {
        config::cli::reset(&config);
        return;
    }

    if args.list {
        config::cli::list(&config);
        return;
    }

    if let Some(set_config) = args.set {
        match config::cli::set(set_config, &mut config).map(|_| config.write()) {
            Ok(Ok(())) => println!("Success"),
            Ok(Err(err)) => println!("Error: {}", err),
            Err(err) => println!("Error: {}", err),
        }
        return;
    }

    // region: TRACING
    setup_tracing(if args.verbose { tracing::Level::TRACE } else { config.log_level() });
    tracing::info!("{}", FIRMWARE_BANNER);
    // endregion TRACING

    if let Some(path) = config.path() {
        tracing::info!("Using config file: {}", path.display());
    }

    if let Err(err) = run(config, args.off, running) {
        tracing::error!("{}", err);
        process::exit(1);
    }
}
