use super::Config;
use crate::controller::sensor::NormalState;

pub fn list(config: &Config) {
    match serde_json::to_string_pretty(config) {
        Ok(json) => println!("Config: {}", json),
        Err(err) => println!("Error: {:?}", err),
    }
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, &'static str> {
    value.parse().map_err(|_| "Could not parse value")
}

fn parse_pin(value: &str) -> Result<u8, &'static str> {
    match parse::<u8>(value)? {
        pin if pin <= 27 => Ok(pin),
        _ => Err("BCM pin out of range"),
    }
}

pub fn set(config_set: Vec<String>, config: &mut Config) -> Result<(), &'static str> {
    let (name, value) = match config_set.as_slice() {
        [name, value] => (name.as_str(), value.as_str()),
        _ => return Err("Expected a key and a value"),
    };

    match name {
        "storage_path" => config.storage_path = value.into(),
        "valve_active_high" => config.valve_active_high = parse(value)?,
        "rain_sensor" => config.rain_sensor = NormalState::try_from(value)?,
        "tick_interval_ms" => match parse(value)? {
            0 => return Err("Tick interval must not be zero"),
            interval => config.tick_interval_ms = interval,
        },
        "reset_pause_ms" => config.reset_pause_ms = parse(value)?,
        "rtc_offset" => config.rtc_offset = parse(value)?,
        "log_level" => {
            parse::<tracing::Level>(value)?;
            config.log_level = value.into();
        }
        "pins.master" => config.pins.master = parse_pin(value)?,
        "pins.link_clock" => config.pins.link_clock = parse_pin(value)?,
        "pins.link_data" => config.pins.link_data = parse_pin(value)?,
        "pins.rain_sensor" => config.pins.rain_sensor = parse_pin(value)?,
        "pins.rain_bypass" => {
            config.pins.rain_bypass = match value {
                "none" => None,
                pin => Some(parse_pin(pin)?),
            }
        }
        "pins.button" => config.pins.button = parse_pin(value)?,
        "pins.overcurrent" => config.pins.overcurrent = parse_pin(value)?,
        _ => {
            let station = name.strip_prefix("pins.stations.").ok_or("Unknown config key")?;
            let station: usize = parse(station)?;
            let pin = config.pins.stations.get_mut(station.wrapping_sub(1)).ok_or("Station out of range")?;
            *pin = parse_pin(value)?;
        }
    }

    println!("Set {}: {}", name, value);
    Ok(())
}

pub fn reset(config: &Config) {
    match config.write_default() {
        Ok(_) => println!("Reset config to defaults"),
        Err(err) => println!("Error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, value: &str, config: &mut Config) -> Result<(), &'static str> {
        super::set(vec![key.into(), value.into()], config)
    }

    #[test]
    fn sets_known_keys() {
        let mut config = Config::default();
        set("valve_active_high", "false", &mut config).unwrap();
        set("rain_sensor", "NC", &mut config).unwrap();
        set("pins.stations.8", "4", &mut config).unwrap();
        set("pins.rain_bypass", "none", &mut config).unwrap();
        set("log_level", "debug", &mut config).unwrap();

        assert!(!config.valve_active_high);
        assert_eq!(config.rain_sensor, NormalState::Closed);
        assert_eq!(config.pins.stations[7], 4);
        assert_eq!(config.pins.rain_bypass, None);
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = Config::default();
        assert!(set("pins.stations.0", "4", &mut config).is_err());
        assert!(set("pins.stations.9", "4", &mut config).is_err());
        assert!(set("pins.master", "40", &mut config).is_err());
        assert!(set("tick_interval_ms", "0", &mut config).is_err());
        assert!(set("log_level", "loud", &mut config).is_err());
        assert!(set("unknown", "1", &mut config).is_err());
        assert!(super::set(vec!["pins.master".into()], &mut config).is_err());
        assert_eq!(config, Config::default());
    }
}
