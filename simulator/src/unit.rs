use hvac_common::ActuatorState;

const HEAT_RATE_PER_STEP: f64 = 0.1;
const COOL_RATE_PER_STEP: f64 = 0.1;
const DRIFT_FRACTION: f64 = 0.02;

/// One simulated HVAC unit with a crude thermal model.
#[derive(Debug, Clone)]
pub struct SimulatedUnit {
    state: ActuatorState,
    temperature: f64,
    outdoor_temperature: f64,
}

impl SimulatedUnit {
    pub fn new(min_off_time: u64, temperature: f64, outdoor_temperature: f64) -> Self {
        Self {
            state: ActuatorState::idle(min_off_time, min_off_time),
            temperature,
            outdoor_temperature,
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Replaces the actuator state. `min_off_time` is a property of the unit,
    /// so whatever the caller sent for it is ignored.
    pub fn apply(&mut self, requested: ActuatorState) -> Result<(), &'static str> {
        if requested.heater && requested.ac {
            return Err("heater and ac cannot run together");
        }
        self.state = ActuatorState {
            min_off_time: self.state.min_off_time,
            ..requested
        };
        Ok(())
    }

    pub fn step(&mut self) {
        if self.state.heater {
            self.temperature += HEAT_RATE_PER_STEP;
        } else if self.state.ac {
            self.temperature -= COOL_RATE_PER_STEP;
        } else {
            self.temperature += (self.outdoor_temperature - self.temperature) * DRIFT_FRACTION;
        }
    }
}
