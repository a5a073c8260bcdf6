pub mod config;
pub mod dispatch;
pub mod error;
pub mod paths;
pub mod report;
pub mod thermostat;
pub mod types;

pub use config::{NewThermostat, RuntimeConfig, ThermostatConfig, ThermostatUpdate};
pub use dispatch::DispatchPolicy;
pub use error::{ControlError, ErrorKind};
pub use paths::*;
pub use report::{AppliedUpdate, LoopReport, UnitOutcome, UnitReport};
pub use thermostat::decide;
pub use types::{Actuation, ActuatorState, FanMode, TemperatureReading, ThermostatMode};
