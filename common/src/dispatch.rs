use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{error::ControlError, types::ActuatorState};

/// Which fields of a proposed state must differ before it is written to a unit.
///
/// `FullState` also compares the tick counters. Units only learn their new
/// `off_time` through these writes, so `ActuationOnly` freezes the off-time
/// gate unless the unit keeps that counter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    #[default]
    FullState,
    ActuationOnly,
}

impl DispatchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullState => "full_state",
            Self::ActuationOnly => "actuation_only",
        }
    }

    pub fn requires_write(self, current: &ActuatorState, next: &ActuatorState) -> bool {
        match self {
            Self::FullState => current != next,
            Self::ActuationOnly => !current.same_actuation(next),
        }
    }
}

impl FromStr for DispatchPolicy {
    type Err = ControlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "full_state" => Ok(Self::FullState),
            "actuation_only" => Ok(Self::ActuationOnly),
            other => Err(ControlError::Configuration(format!(
                "unknown dispatch policy '{other}'"
            ))),
        }
    }
}
