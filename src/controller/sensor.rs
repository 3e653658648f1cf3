use core::fmt;
use serde::{Deserialize, Serialize};

/// Seconds of the minute at which the rain sensor is sampled
pub const CHECK_SECONDS: [u8; 2] = [15, 45];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NormalState {
    Closed = 0,
    Open = 1,
}

impl fmt::Display for NormalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Closed => write!(f, "NC"),
            Self::Open => write!(f, "NO"),
        }
    }
}

impl TryFrom<&str> for NormalState {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NC" | "nc" => Ok(Self::Closed),
            "NO" | "no" => Ok(Self::Open),
            _ => Err("Expected NO or NC"),
        }
    }
}

pub trait RainSensor: Send {
    /// Rain is sensed and the sensor is not bypassed
    fn sense(&mut self) -> bool;
}

/// Debounced view of the rain sensor, updated at [CHECK_SECONDS]
#[derive(Debug, Default)]
pub struct RainMonitor {
    raining: bool,
}

impl RainMonitor {
    pub fn is_raining(&self) -> bool {
        self.raining
    }

    /// Record a sample. Returns [true] when rain starts.
    pub fn update(&mut self, sensed: bool) -> bool {
        let started = sensed && !self.raining;
        if sensed != self.raining {
            tracing::info!("Rain sensor {}", if sensed { "activated" } else { "deactivated" });
        }
        self.raining = sensed;
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_only() {
        let mut monitor = RainMonitor::default();
        assert!(!monitor.update(false));
        assert!(monitor.update(true), "Rain starts");
        assert!(!monitor.update(true), "Still raining");
        assert!(monitor.is_raining());
        assert!(!monitor.update(false));
        assert!(!monitor.is_raining());
        assert!(monitor.update(true), "Rain starts again");
    }

    #[test]
    fn normal_state_parsing() {
        assert_eq!(NormalState::try_from("NC"), Ok(NormalState::Closed));
        assert_eq!(NormalState::try_from("no"), Ok(NormalState::Open));
        assert!(NormalState::try_from("open").is_err());
        assert_eq!(NormalState::Open.to_string(), "NO");
    }
}
