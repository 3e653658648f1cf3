use core::fmt;
use std::{error::Error, io};

use super::{config, storage};

pub type Result<T> = core::result::Result<T, SetupError>;

#[derive(Debug)]
pub enum SetupError {
    ConfigError(config::result::Error),

    StorageError(storage::result::Error),

    GpioError(rppal::gpio::Error),

    /// Thread could not be spawned
    IoError(io::Error),
}

impl From<config::result::Error> for SetupError {
    fn from(err: config::result::Error) -> Self {
        SetupError::ConfigError(err)
    }
}

impl From<storage::result::Error> for SetupError {
    fn from(err: storage::result::Error) -> Self {
        SetupError::StorageError(err)
    }
}

impl From<rppal::gpio::Error> for SetupError {
    fn from(err: rppal::gpio::Error) -> Self {
        SetupError::GpioError(err)
    }
}

impl From<io::Error> for SetupError {
    fn from(err: io::Error) -> Self {
        SetupError::IoError(err)
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::ConfigError(err) => write!(f, "Configuration error: {}", err),
            SetupError::StorageError(err) => write!(f, "Storage error: {}", err),
            SetupError::GpioError(err) => write!(f, "GPIO error: {}", err),
            SetupError::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl Error for SetupError {}
