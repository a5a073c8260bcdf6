use serde::Serialize;

use crate::{
    config::ThermostatConfig,
    error::{ControlError, ErrorKind},
    types::{Actuation, ActuatorState},
};

/// What one successful unit cycle observed and proposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedUpdate {
    pub temperature: f64,
    pub previous: ActuatorState,
    pub next: ActuatorState,
    pub dispatched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UnitOutcome {
    Applied {
        actuation: Actuation,
        #[serde(flatten)]
        update: AppliedUpdate,
    },
    Failed {
        kind: ErrorKind,
        error: String,
    },
}

impl From<Result<AppliedUpdate, ControlError>> for UnitOutcome {
    fn from(result: Result<AppliedUpdate, ControlError>) -> Self {
        match result {
            Ok(update) => Self::Applied {
                actuation: update.next.actuation(),
                update,
            },
            Err(err) => Self::Failed {
                kind: err.kind(),
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    #[serde(rename = "uuid")]
    pub id: String,
    pub area: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn new(config: &ThermostatConfig, result: Result<AppliedUpdate, ControlError>) -> Self {
        Self {
            id: config.id.clone(),
            area: config.area.clone(),
            outcome: result.into(),
        }
    }

    /// A unit that failed before it could be cycled, e.g. an undecodable record.
    pub fn failed(id: impl Into<String>, area: impl Into<String>, error: ControlError) -> Self {
        Self {
            id: id.into(),
            area: area.into(),
            outcome: UnitOutcome::from(Err::<AppliedUpdate, _>(error)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Applied { .. })
    }

    pub fn dispatched(&self) -> bool {
        matches!(
            &self.outcome,
            UnitOutcome::Applied { update, .. } if update.dispatched
        )
    }
}

/// Result of one control tick across every stored thermostat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopReport {
    #[serde(rename = "startedAtEpoch")]
    pub started_at_epoch: i64,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub dispatched: usize,
    pub units: Vec<UnitReport>,
    #[serde(rename = "listError", skip_serializing_if = "Option::is_none")]
    pub list_error: Option<String>,
}

impl LoopReport {
    pub fn new(started_at_epoch: i64, duration_ms: u64, units: Vec<UnitReport>) -> Self {
        let succeeded = units.iter().filter(|unit| unit.is_success()).count();
        let dispatched = units.iter().filter(|unit| unit.dispatched()).count();
        Self {
            started_at_epoch,
            duration_ms,
            succeeded,
            failed: units.len() - succeeded,
            dispatched,
            units,
            list_error: None,
        }
    }

    pub fn list_failed(started_at_epoch: i64, duration_ms: u64, error: String) -> Self {
        Self {
            list_error: Some(error),
            ..Self::new(started_at_epoch, duration_ms, Vec::new())
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| !unit.is_success())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn config(id: &str) -> ThermostatConfig {
        ThermostatConfig::new(id, "den", "http://hvac", "http://temp")
    }

    fn applied(dispatched: bool) -> Result<AppliedUpdate, ControlError> {
        Ok(AppliedUpdate {
            temperature: 68.0,
            previous: ActuatorState::idle(3, 5),
            next: ActuatorState::heating(4, 5),
            dispatched,
        })
    }

    #[test]
    fn report_counts_outcomes() {
        let report = LoopReport::new(
            1_700_000_000,
            12,
            vec![
                UnitReport::new(&config("a"), applied(true)),
                UnitReport::new(&config("b"), applied(false)),
                UnitReport::new(
                    &config("c"),
                    Err(ControlError::InvalidMode("turbo".to_string())),
                ),
            ],
        );

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            report.failures().map(|unit| unit.id.as_str()).collect::<Vec<_>>(),
            vec!["c"]
        );
    }

    #[test]
    fn unit_report_serializes_flat() {
        let failed = UnitReport::new(
            &config("c"),
            Err(ControlError::transport("http://hvac", "timed out after 5000ms")),
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "uuid": "c",
                "area": "den",
                "status": "failed",
                "kind": "TRANSPORT",
                "error": "transport error at http://hvac: timed out after 5000ms",
            })
        );

        let ok = serde_json::to_value(UnitReport::new(&config("a"), applied(true))).unwrap();
        assert_eq!(ok["status"], json!("applied"));
        assert_eq!(ok["actuation"], json!("HEATING"));
        assert_eq!(ok["dispatched"], json!(true));
        assert_eq!(ok["next"]["heater"], json!(true));
    }

    #[test]
    fn failed_unit_counts_without_a_config() {
        let report = LoopReport::new(
            0,
            1,
            vec![
                UnitReport::new(&config("a"), applied(false)),
                UnitReport::failed(
                    "#1",
                    "",
                    ControlError::Configuration("malformed stored record".to_string()),
                ),
            ],
        );
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.units[1].outcome,
            UnitOutcome::Failed {
                kind: ErrorKind::Configuration,
                ..
            }
        ));
    }

    #[test]
    fn list_failure_has_no_units() {
        let report = LoopReport::list_failed(0, 1, "store unavailable".to_string());
        assert!(report.units.is_empty());
        assert_eq!(report.succeeded + report.failed, 0);
        assert_eq!(
            serde_json::to_value(&report).unwrap()["listError"],
            json!("store unavailable")
        );
    }
}
