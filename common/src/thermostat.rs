use crate::{
    config::ThermostatConfig,
    error::ControlError,
    types::{Actuation, ActuatorState, FanMode, ThermostatMode},
};

/// Setpoint band with its hysteresis margin. A single setpoint is a band
/// whose low and high bounds are equal.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    low: f64,
    high: f64,
    tolerance: f64,
}

impl Band {
    fn new(low: i32, high: i32, tolerance: i32) -> Self {
        Self {
            low: f64::from(low),
            high: f64::from(high),
            tolerance: f64::from(tolerance),
        }
    }

    fn setpoint(desired: i32, tolerance: i32) -> Self {
        Self::new(desired, desired, tolerance)
    }

    // A running heater keeps going until the bound itself is reached.
    fn too_cold(&self, temperature: f64, heater_on: bool) -> bool {
        temperature < self.low - self.tolerance || (temperature < self.low && heater_on)
    }

    fn too_hot(&self, temperature: f64, ac_on: bool) -> bool {
        temperature > self.high + self.tolerance || (temperature > self.high && ac_on)
    }
}

/// Computes the next actuator state for one unit.
///
/// Pure: the result depends only on the arguments. Cooling is the only
/// transition gated on `off_time >= min_off_time`, and the only one that
/// resets `off_time`.
pub fn decide(
    config: &ThermostatConfig,
    current: &ActuatorState,
    temperature: f64,
) -> Result<ActuatorState, ControlError> {
    let mode = config.mode()?;
    config.validate()?;
    let fan = config.fan_mode()?;

    let next = match mode {
        ThermostatMode::Off => current.advance(Actuation::Idle),
        ThermostatMode::Eco => hold_band(
            Band::new(
                config.eco_min_temperature,
                config.eco_max_temperature,
                config.tolerance,
            ),
            current,
            temperature,
        ),
        ThermostatMode::Normal => hold_band(
            Band::setpoint(config.desired_temperature, config.tolerance),
            current,
            temperature,
        ),
        ThermostatMode::Heat => {
            let band = Band::setpoint(config.desired_temperature, config.tolerance);
            if band.too_cold(temperature, current.heater) {
                current.advance(Actuation::Heating)
            } else {
                current.advance(Actuation::Idle)
            }
        }
        ThermostatMode::Cool => {
            let band = Band::setpoint(config.desired_temperature, config.tolerance);
            if current.cooling_gate_open() && band.too_hot(temperature, current.ac) {
                ActuatorState::cooling(current.min_off_time)
            } else {
                current.advance(Actuation::Vent)
            }
        }
    };

    Ok(match fan {
        FanMode::On => next.with_fan_forced(),
        FanMode::Auto => next,
    })
}

fn hold_band(band: Band, current: &ActuatorState, temperature: f64) -> ActuatorState {
    if band.too_cold(temperature, current.heater) {
        current.advance(Actuation::Heating)
    } else if current.cooling_gate_open() && band.too_hot(temperature, current.ac) {
        ActuatorState::cooling(current.min_off_time)
    } else {
        current.advance(Actuation::Vent)
    }
}
