pub mod cli;

use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use super::{sensor::NormalState, station::STATION_COUNT, FIRMWARE_VERSION};

#[cfg(unix)]
const STORAGE_FILE_PATH: &'static str = "/var/opt/irrigation-timer.bin";

#[cfg(not(unix))]
const STORAGE_FILE_PATH: &'static str = "./irrigation-timer.bin";

/// BCM pin numbers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioPins {
    pub stations: [u8; STATION_COUNT],
    pub master: u8,
    pub link_clock: u8,
    pub link_data: u8,
    pub rain_sensor: u8,
    pub rain_bypass: Option<u8>,
    pub button: u8,
    pub overcurrent: u8,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            stations: [5, 6, 13, 19, 26, 16, 20, 21],
            master: 12,
            link_clock: 17,
            link_data: 27,
            rain_sensor: 14,
            rain_bypass: Some(23),
            button: 22,
            overcurrent: 24,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to config file
    #[serde(skip)]
    path: Option<PathBuf>,

    pub firmware_version: u16,

    /// Non-volatile program storage image
    pub storage_path: PathBuf,

    pub pins: GpioPins,

    /// Valve outputs energize on a high level
    pub valve_active_high: bool,

    pub rain_sensor: NormalState,

    /// Tick period (milliseconds)
    pub tick_interval_ms: u32,

    /// Delay before answering a reset request (milliseconds)
    pub reset_pause_ms: u32,

    /// Clock offset from the host clock (seconds)
    pub rtc_offset: i64,

    /// Maximum log level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: None,
            firmware_version: FIRMWARE_VERSION,
            storage_path: STORAGE_FILE_PATH.into(),
            pins: GpioPins::default(),
            valve_active_high: true,
            rain_sensor: NormalState::Open,
            tick_interval_ms: 125,
            reset_pause_ms: 1000,
            rtc_offset: 0,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn new(path: PathBuf) -> Self {
        Config {
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.path.as_ref().map(|path| path.exists()).unwrap_or(false)
    }

    fn file_path(&self) -> result::Result<&PathBuf> {
        self.path.as_ref().ok_or(result::Error::NoPath)
    }

    /// Read the config file this config points at
    pub fn read(&self) -> result::Result<Config> {
        let path = self.file_path()?;
        let reader = io::BufReader::new(OpenOptions::new().read(true).open(path)?);
        let mut config: Config = bson::from_reader(reader)?;
        config.path = Some(path.clone());
        Ok(config)
    }

    pub fn write(&self) -> result::Result<()> {
        let buf = bson::to_vec(self)?;
        let mut writer = io::BufWriter::new(OpenOptions::new().write(true).create(true).truncate(true).open(self.file_path()?)?);
        writer.write_all(&buf)?;
        Ok(writer.flush()?)
    }

    /// Overwrite the config file with defaults
    pub fn write_default(&self) -> result::Result<()> {
        Config {
            path: self.path.clone(),
            ..Default::default()
        }
        .write()
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub mod result {
    use std::{error, fmt, io, sync::Arc};

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Clone, Debug)]
    #[non_exhaustive]
    pub enum Error {
        /// Config has no file path
        NoPath,

        Io(Arc<io::Error>),

        #[non_exhaustive]
        SerializationError(Arc<bson::ser::Error>),

        #[non_exhaustive]
        DeserializationError(Arc<bson::de::Error>),
    }

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match *self {
                Error::NoPath => write!(f, "No config file path"),
                Error::Io(ref err) => write!(f, "IO Error: {:?}", err),
                Error::SerializationError(ref err) => write!(f, "Serialization Error: {:?}", err),
                Error::DeserializationError(ref err) => write!(f, "Deserialization Error: {:?}", err),
            }
        }
    }

    impl error::Error for Error {}

    impl From<bson::ser::Error> for Error {
        fn from(err: bson::ser::Error) -> Error {
            Error::SerializationError(Arc::new(err))
        }
    }

    impl From<bson::de::Error> for Error {
        fn from(err: bson::de::Error) -> Error {
            Error::DeserializationError(Arc::new(err))
        }
    }

    impl From<io::Error> for Error {
        fn from(err: io::Error) -> Error {
            Error::Io(Arc::new(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("irrigation-timer-{}-{}.dat", name, std::process::id()))
    }

    #[test]
    fn round_trip_through_file() {
        let path = temp_path("config");
        let mut config = Config::new(path.clone());
        config.rtc_offset = -3600;
        config.pins.rain_bypass = None;
        config.rain_sensor = NormalState::Closed;
        config.write().unwrap();
        assert!(config.exists());

        let read = Config::new(path.clone()).read().unwrap();
        assert_eq!(read, config);
        assert_eq!(read.path(), Some(path.as_path()));

        config.write_default().unwrap();
        assert_eq!(Config::new(path.clone()).read().unwrap(), Config::new(path.clone()));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file() {
        let config = Config::new(temp_path("missing"));
        assert!(!config.exists());
        assert!(matches!(config.read(), Err(result::Error::Io(_))));
        assert!(matches!(Config::default().write(), Err(result::Error::NoPath)));
    }

    #[test]
    fn log_level_falls_back_to_info() {
        let mut config = Config::default();
        assert_eq!(config.log_level(), tracing::Level::INFO);
        config.log_level = "trace".into();
        assert_eq!(config.log_level(), tracing::Level::TRACE);
        config.log_level = "loud".into();
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }
}
