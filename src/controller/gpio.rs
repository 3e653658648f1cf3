use std::sync::Arc;

use rppal::gpio::{Gpio, InputPin, IoPin, Level, Mode, OutputPin, Trigger};

use super::{
    config::Config,
    controls::Buttons,
    remote::link::WireLink,
    sensor::{NormalState, RainSensor},
    station::{StationIndex, ValveBank, ValveDriver},
};

/// Station and master valve outputs
pub struct GpioValves {
    stations: Vec<OutputPin>,
    master: OutputPin,
    active_high: bool,
}

impl GpioValves {
    pub fn new(gpio: &Gpio, config: &Config) -> rppal::gpio::Result<Self> {
        let inactive = if config.valve_active_high { Level::Low } else { Level::High };

        let mut stations = Vec::with_capacity(config.pins.stations.len());
        for pin in config.pins.stations {
            let mut output = gpio.get(pin)?.into_output();
            output.write(inactive);
            stations.push(output);
        }

        let mut master = gpio.get(config.pins.master)?.into_output();
        master.write(inactive);

        Ok(Self {
            stations,
            master,
            active_high: config.valve_active_high,
        })
    }

    fn level(&self, open: bool) -> Level {
        if open == self.active_high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl ValveDriver for GpioValves {
    fn set_station(&mut self, station: StationIndex, open: bool) {
        let level = self.level(open);
        if let Some(output) = self.stations.get_mut(station) {
            output.write(level);
        }
    }

    fn set_master(&mut self, open: bool) {
        let level = self.level(open);
        self.master.write(level);
    }
}

/// Clock input plus bidirectional data line
pub struct GpioLink {
    clock: InputPin,
    data: IoPin,
}

impl GpioLink {
    pub fn new(gpio: &Gpio, config: &Config) -> rppal::gpio::Result<Self> {
        Ok(Self {
            clock: gpio.get(config.pins.link_clock)?.into_input_pulldown(),
            data: gpio.get(config.pins.link_data)?.into_io(Mode::Input),
        })
    }
}

impl WireLink for GpioLink {
    fn clock(&mut self) -> bool {
        self.clock.is_high()
    }

    fn data(&mut self) -> bool {
        self.data.is_high()
    }

    fn drive_data(&mut self, high: bool) {
        self.data.set_mode(Mode::Output);
        self.data.write(if high { Level::High } else { Level::Low });
    }

    fn release_data(&mut self) {
        self.data.set_mode(Mode::Input);
    }
}

/// Rain sensor switch with an optional bypass switch. Both pull the input low when closed.
pub struct GpioRainSensor {
    sensor: InputPin,
    bypass: Option<InputPin>,
    normal_state: NormalState,
}

impl GpioRainSensor {
    pub fn new(gpio: &Gpio, config: &Config) -> rppal::gpio::Result<Self> {
        let bypass = match config.pins.rain_bypass {
            Some(pin) => Some(gpio.get(pin)?.into_input_pullup()),
            None => None,
        };

        Ok(Self {
            sensor: gpio.get(config.pins.rain_sensor)?.into_input_pullup(),
            bypass,
            normal_state: config.rain_sensor,
        })
    }
}

impl RainSensor for GpioRainSensor {
    fn sense(&mut self) -> bool {
        if self.bypass.as_ref().map(|pin| pin.is_low()).unwrap_or(false) {
            return false;
        }

        match self.normal_state {
            NormalState::Open => self.sensor.is_low(),
            NormalState::Closed => self.sensor.is_high(),
        }
    }
}

/// Push button to ground
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    pub fn new(gpio: &Gpio, config: &Config) -> rppal::gpio::Result<Self> {
        Ok(Self {
            pin: gpio.get(config.pins.button)?.into_input_pullup(),
        })
    }
}

impl Buttons for GpioButton {
    fn any_pressed(&mut self) -> bool {
        self.pin.is_low()
    }
}

/// Overcurrent comparator output, active low.
///
/// The interrupt stays armed for as long as this value is alive.
pub struct OvercurrentInput {
    pin: InputPin,
}

impl OvercurrentInput {
    pub fn new(gpio: &Gpio, config: &Config) -> rppal::gpio::Result<Self> {
        Ok(Self {
            pin: gpio.get(config.pins.overcurrent)?.into_input_pullup(),
        })
    }

    /// Trip the fault latch of `valves` on every falling edge
    pub fn arm(&mut self, valves: Arc<ValveBank>) -> rppal::gpio::Result<()> {
        self.pin.set_async_interrupt(Trigger::FallingEdge, move |_| {
            valves.overcurrent_detected();
            tracing::error!("Overcurrent detected, all valves closed");
        })
    }

    pub fn is_active(&self) -> bool {
        self.pin.is_low()
    }
}

/// All board peripherals
pub struct Peripherals {
    pub valves: GpioValves,
    pub link: GpioLink,
    pub rain_sensor: GpioRainSensor,
    pub button: GpioButton,
    pub overcurrent: OvercurrentInput,
}

impl Peripherals {
    pub fn new(config: &Config) -> rppal::gpio::Result<Self> {
        let gpio = Gpio::new()?;
        tracing::debug!("GPIO peripheral ready");

        Ok(Self {
            valves: GpioValves::new(&gpio, config)?,
            link: GpioLink::new(&gpio, config)?,
            rain_sensor: GpioRainSensor::new(&gpio, config)?,
            button: GpioButton::new(&gpio, config)?,
            overcurrent: OvercurrentInput::new(&gpio, config)?,
        })
    }
}
