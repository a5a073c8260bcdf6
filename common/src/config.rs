use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dispatch::DispatchPolicy,
    error::ControlError,
    types::{FanMode, ThermostatMode},
};

pub const DEFAULT_DESIRED_TEMPERATURE: i32 = 70;
pub const DEFAULT_ECO_MIN_TEMPERATURE: i32 = 65;
pub const DEFAULT_ECO_MAX_TEMPERATURE: i32 = 78;
pub const DEFAULT_TOLERANCE: i32 = 1;

/// One stored thermostat record.
///
/// `mode` and `fan` keep their wire strings so a record with an unknown value
/// can still be listed; it only fails when a decision is made for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermostatConfig {
    #[serde(rename = "uuid")]
    pub id: String,
    pub area: String,
    pub hvac_url: String,
    pub temperature_url: String,
    pub desired_temperature: i32,
    pub eco_min_temperature: i32,
    pub eco_max_temperature: i32,
    pub tolerance: i32,
    pub mode: String,
    pub fan: String,
}

impl ThermostatConfig {
    pub fn new(
        id: impl Into<String>,
        area: impl Into<String>,
        hvac_url: impl Into<String>,
        temperature_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            area: area.into(),
            hvac_url: hvac_url.into(),
            temperature_url: temperature_url.into(),
            desired_temperature: DEFAULT_DESIRED_TEMPERATURE,
            eco_min_temperature: DEFAULT_ECO_MIN_TEMPERATURE,
            eco_max_temperature: DEFAULT_ECO_MAX_TEMPERATURE,
            tolerance: DEFAULT_TOLERANCE,
            mode: ThermostatMode::Normal.as_str().to_string(),
            fan: FanMode::Auto.as_str().to_string(),
        }
    }

    pub fn mode(&self) -> Result<ThermostatMode, ControlError> {
        self.mode.parse()
    }

    pub fn fan_mode(&self) -> Result<FanMode, ControlError> {
        self.fan.parse()
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        if self.tolerance < 0 {
            return Err(ControlError::Configuration(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.eco_min_temperature > self.eco_max_temperature {
            return Err(ControlError::Configuration(format!(
                "eco_min_temperature {} exceeds eco_max_temperature {}",
                self.eco_min_temperature, self.eco_max_temperature
            )));
        }
        self.fan_mode()?;
        Ok(())
    }
}

/// Body of a create request: the three fields a new thermostat must name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThermostat {
    pub area: String,
    pub hvac_url: String,
    pub temperature_url: String,
}

impl NewThermostat {
    pub fn from_json(body: &Value) -> Result<Self, ControlError> {
        Ok(Self {
            area: required_string(body, "area")?,
            hvac_url: required_string(body, "hvac_url")?,
            temperature_url: required_string(body, "temperature_url")?,
        })
    }

    pub fn into_config(self, id: impl Into<String>) -> ThermostatConfig {
        ThermostatConfig::new(id, self.area, self.hvac_url, self.temperature_url)
    }
}

fn required_string(body: &Value, field: &str) -> Result<String, ControlError> {
    match body.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ControlError::Configuration(format!("must specify {field}"))),
    }
}

/// Partial update. Fields of the wrong JSON type, and unknown mode or fan
/// values, are dropped rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThermostatUpdate {
    pub area: Option<String>,
    pub hvac_url: Option<String>,
    pub temperature_url: Option<String>,
    pub desired_temperature: Option<i32>,
    pub eco_min_temperature: Option<i32>,
    pub eco_max_temperature: Option<i32>,
    pub tolerance: Option<i32>,
    pub mode: Option<ThermostatMode>,
    pub fan: Option<FanMode>,
}

impl ThermostatUpdate {
    pub fn from_json(body: &Value) -> Self {
        let string = |field: &str| body.get(field).and_then(Value::as_str).map(str::to_string);
        let integer = |field: &str| {
            body.get(field)
                .and_then(Value::as_i64)
                .and_then(|value| i32::try_from(value).ok())
        };

        Self {
            area: string("area"),
            hvac_url: string("hvac_url"),
            temperature_url: string("temperature_url"),
            desired_temperature: integer("desired_temperature"),
            eco_min_temperature: integer("eco_min_temperature"),
            eco_max_temperature: integer("eco_max_temperature"),
            tolerance: integer("tolerance"),
            mode: string("mode").and_then(|value| value.parse().ok()),
            fan: string("fan").and_then(|value| value.parse().ok()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, config: &mut ThermostatConfig) {
        if let Some(area) = self.area {
            config.area = area;
        }
        if let Some(hvac_url) = self.hvac_url {
            config.hvac_url = hvac_url;
        }
        if let Some(temperature_url) = self.temperature_url {
            config.temperature_url = temperature_url;
        }
        if let Some(desired) = self.desired_temperature {
            config.desired_temperature = desired;
        }
        if let Some(eco_min) = self.eco_min_temperature {
            config.eco_min_temperature = eco_min;
        }
        if let Some(eco_max) = self.eco_max_temperature {
            config.eco_max_temperature = eco_max;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(mode) = self.mode {
            config.mode = mode.as_str().to_string();
        }
        if let Some(fan) = self.fan {
            config.fan = fan.as_str().to_string();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub tick_interval_ms: u64,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
    pub http_port: u16,
    #[serde(default = "default_run_on_update")]
    pub run_on_update: bool,
}

fn default_run_on_update() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            request_timeout_ms: 5_000,
            dispatch_policy: DispatchPolicy::default(),
            http_port: 8080,
            run_on_update: default_run_on_update(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1_000, 3_600_000);
        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 60_000);
        if self.http_port == 0 {
            self.http_port = 8080;
        }
    }
}
