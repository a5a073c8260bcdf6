use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
    Normal,
    Eco,
}

impl ThermostatMode {
    pub const ALL: [Self; 5] = [Self::Off, Self::Heat, Self::Cool, Self::Normal, Self::Eco];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Normal => "normal",
            Self::Eco => "eco",
        }
    }
}

impl FromStr for ThermostatMode {
    type Err = ControlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| ControlError::InvalidMode(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    On,
    Auto,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for FanMode {
    type Err = ControlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "on" => Ok(Self::On),
            "auto" => Ok(Self::Auto),
            other => Err(ControlError::Configuration(format!(
                "unknown fan setting '{other}'"
            ))),
        }
    }
}

/// The named actuator combinations a decision can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actuation {
    Idle,
    Vent,
    Heating,
    Cooling,
}

impl Actuation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Vent => "VENT",
            Self::Heating => "HEATING",
            Self::Cooling => "COOLING",
        }
    }

    pub fn heater(self) -> bool {
        matches!(self, Self::Heating)
    }

    pub fn ac(self) -> bool {
        matches!(self, Self::Cooling)
    }

    pub fn fan(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Snapshot of one unit's actuators plus its anti-short-cycle counters.
///
/// `off_time` counts control ticks since cooling last started. `min_off_time`
/// belongs to the unit and is carried through every decision untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub heater: bool,
    pub ac: bool,
    pub fan: bool,
    pub off_time: u64,
    pub min_off_time: u64,
}

impl ActuatorState {
    pub fn new(actuation: Actuation, off_time: u64, min_off_time: u64) -> Self {
        Self {
            heater: actuation.heater(),
            ac: actuation.ac(),
            fan: actuation.fan(),
            off_time,
            min_off_time,
        }
    }

    pub fn idle(off_time: u64, min_off_time: u64) -> Self {
        Self::new(Actuation::Idle, off_time, min_off_time)
    }

    pub fn vent(off_time: u64, min_off_time: u64) -> Self {
        Self::new(Actuation::Vent, off_time, min_off_time)
    }

    pub fn heating(off_time: u64, min_off_time: u64) -> Self {
        Self::new(Actuation::Heating, off_time, min_off_time)
    }

    /// Cooling always restarts the off-time counter.
    pub fn cooling(min_off_time: u64) -> Self {
        Self::new(Actuation::Cooling, 0, min_off_time)
    }

    /// Next state for `actuation` one tick later, keeping this unit's counters.
    pub fn advance(&self, actuation: Actuation) -> Self {
        Self::new(actuation, self.off_time.saturating_add(1), self.min_off_time)
    }

    pub fn cooling_gate_open(&self) -> bool {
        self.off_time >= self.min_off_time
    }

    pub fn with_fan_forced(self) -> Self {
        Self { fan: true, ..self }
    }

    pub fn actuation(&self) -> Actuation {
        if self.heater {
            Actuation::Heating
        } else if self.ac {
            Actuation::Cooling
        } else if self.fan {
            Actuation::Vent
        } else {
            Actuation::Idle
        }
    }

    pub fn same_actuation(&self, other: &Self) -> bool {
        self.heater == other.heater && self.ac == other.ac && self.fan == other.fan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub temperature: f64,
}
