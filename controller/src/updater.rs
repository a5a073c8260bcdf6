use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use hvac_common::{
    decide, ActuatorState, AppliedUpdate, ControlError, DispatchPolicy, LoopReport,
    RuntimeConfig, ThermostatConfig, UnitReport,
};

use crate::{store::ConfigStore, transport::HvacTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterOptions {
    pub request_timeout: Duration,
    pub dispatch_policy: DispatchPolicy,
}

impl From<&RuntimeConfig> for UpdaterOptions {
    fn from(runtime: &RuntimeConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(runtime.request_timeout_ms),
            dispatch_policy: runtime.dispatch_policy,
        }
    }
}

/// Runs control ticks. Holds no state between ticks beyond its collaborators.
#[derive(Clone)]
pub struct Updater {
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn HvacTransport>,
    options: UpdaterOptions,
}

impl Updater {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn HvacTransport>,
        options: UpdaterOptions,
    ) -> Self {
        Self {
            store,
            transport,
            options,
        }
    }

    /// One tick over every stored thermostat. Units run concurrently and a
    /// failing unit never stops the others.
    pub async fn run_once(&self) -> LoopReport {
        let started = Instant::now();
        let started_at_epoch = Utc::now().timestamp();

        let records = match self.store.list().await {
            Ok(records) => records,
            Err(err) => {
                warn!("failed to list thermostats: {err:#}");
                return LoopReport::list_failed(
                    started_at_epoch,
                    elapsed_ms(started),
                    format!("{err:#}"),
                );
            }
        };

        let units = join_all(records.iter().map(|record| async move {
            let config = match record {
                Ok(config) => config,
                Err(malformed) => {
                    warn!(uuid = %malformed.id, "skipping stored record: {}", malformed.error);
                    return UnitReport::failed(
                        malformed.id.as_str(),
                        malformed.area.as_str(),
                        malformed.error.clone(),
                    );
                }
            };
            let result = update_unit(self.transport.as_ref(), config, self.options).await;
            if let Err(err) = &result {
                warn!(uuid = %config.id, area = %config.area, "unit update failed: {err}");
            }
            UnitReport::new(config, result)
        }))
        .await;

        let report = LoopReport::new(started_at_epoch, elapsed_ms(started), units);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dispatched = report.dispatched,
            "control tick finished in {}ms",
            report.duration_ms
        );
        report
    }
}

/// Fetch, decide and dispatch for a single unit, strictly in that order.
pub async fn update_unit(
    transport: &dyn HvacTransport,
    config: &ThermostatConfig,
    options: UpdaterOptions,
) -> Result<AppliedUpdate, ControlError> {
    let current = bounded(
        &config.hvac_url,
        options.request_timeout,
        transport.get_actuator_state(&config.hvac_url),
    )
    .await?;
    let temperature = bounded(
        &config.temperature_url,
        options.request_timeout,
        transport.get_temperature(&config.temperature_url),
    )
    .await?;

    let next = decide(config, &current, temperature)?;
    debug!(
        uuid = %config.id,
        mode = %config.mode,
        temperature,
        "decided {} -> {}",
        current.actuation().as_str(),
        next.actuation().as_str()
    );

    let dispatched = dispatch(transport, &config.hvac_url, &current, &next, options).await?;

    Ok(AppliedUpdate {
        temperature,
        previous: current,
        next,
        dispatched,
    })
}

/// Writes `next` when the policy sees a difference. Returns whether it wrote.
pub async fn dispatch(
    transport: &dyn HvacTransport,
    endpoint: &str,
    current: &ActuatorState,
    next: &ActuatorState,
    options: UpdaterOptions,
) -> Result<bool, ControlError> {
    if !options.dispatch_policy.requires_write(current, next) {
        return Ok(false);
    }

    bounded(
        endpoint,
        options.request_timeout,
        transport.set_actuator_state(endpoint, next),
    )
    .await?;
    info!(
        "hvac {endpoint} set to {} (off_time {})",
        next.actuation().as_str(),
        next.off_time
    );
    Ok(true)
}

async fn bounded<T>(
    endpoint: &str,
    limit: Duration,
    call: impl Future<Output = Result<T, ControlError>>,
) -> Result<T, ControlError> {
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ControlError::transport(
            endpoint,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use hvac_common::{Actuation, ErrorKind, UnitOutcome};

    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    /// Scripted unit endpoints keyed by url. Records every write.
    #[derive(Default)]
    struct FakeTransport {
        states: HashMap<String, ActuatorState>,
        temperatures: HashMap<String, f64>,
        failing_writes: Vec<String>,
        stalled: Vec<String>,
        writes: Mutex<Vec<(String, ActuatorState)>>,
    }

    impl FakeTransport {
        fn unit(mut self, name: &str, state: ActuatorState, temperature: f64) -> Self {
            self.states.insert(hvac_url(name), state);
            self.temperatures.insert(temperature_url(name), temperature);
            self
        }

        fn writes(&self) -> Vec<(String, ActuatorState)> {
            self.writes.lock().unwrap().clone()
        }

        async fn stall_if_needed(&self, endpoint: &str) {
            if self.stalled.iter().any(|url| url == endpoint) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl HvacTransport for FakeTransport {
        async fn get_actuator_state(&self, endpoint: &str) -> Result<ActuatorState, ControlError> {
            self.stall_if_needed(endpoint).await;
            self.states
                .get(endpoint)
                .copied()
                .ok_or_else(|| ControlError::transport(endpoint, "connection refused"))
        }

        async fn get_temperature(&self, endpoint: &str) -> Result<f64, ControlError> {
            self.stall_if_needed(endpoint).await;
            self.temperatures
                .get(endpoint)
                .copied()
                .ok_or_else(|| ControlError::transport(endpoint, "connection refused"))
        }

        async fn set_actuator_state(
            &self,
            endpoint: &str,
            state: &ActuatorState,
        ) -> Result<(), ControlError> {
            if self.failing_writes.iter().any(|url| url == endpoint) {
                return Err(ControlError::transport(endpoint, "HTTP status 500"));
            }
            self.writes
                .lock()
                .unwrap()
                .push((endpoint.to_string(), *state));
            Ok(())
        }
    }

    fn hvac_url(name: &str) -> String {
        format!("http://{name}/hvac")
    }

    fn temperature_url(name: &str) -> String {
        format!("http://{name}/temperature")
    }

    fn thermostat(name: &str, mode: &str) -> ThermostatConfig {
        let mut config =
            ThermostatConfig::new(name, name, hvac_url(name), temperature_url(name));
        config.mode = mode.to_string();
        config
    }

    fn options(policy: DispatchPolicy) -> UpdaterOptions {
        UpdaterOptions {
            request_timeout: Duration::from_secs(5),
            dispatch_policy: policy,
        }
    }

    fn updater(
        configs: Vec<ThermostatConfig>,
        transport: Arc<FakeTransport>,
        policy: DispatchPolicy,
    ) -> Updater {
        Updater::new(
            Arc::new(MemoryStore::with_records(configs)),
            transport,
            options(policy),
        )
    }

    fn failure_kind(report: &UnitReport) -> Option<ErrorKind> {
        match &report.outcome {
            UnitOutcome::Failed { kind, .. } => Some(*kind),
            UnitOutcome::Applied { .. } => None,
        }
    }

    #[tokio::test]
    async fn heats_and_writes_new_state() {
        let transport =
            Arc::new(FakeTransport::default().unit("den", ActuatorState::idle(3, 5), 68.0));
        let mut config = thermostat("den", "heat");
        config.desired_temperature = 70;

        let report = updater(vec![config], transport.clone(), DispatchPolicy::FullState)
            .run_once()
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            transport.writes(),
            vec![(hvac_url("den"), ActuatorState::heating(4, 5))]
        );
        assert!(matches!(
            report.units[0].outcome,
            UnitOutcome::Applied {
                actuation: Actuation::Heating,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_mode_fails_only_that_unit() {
        let transport = Arc::new(
            FakeTransport::default()
                .unit("attic", ActuatorState::idle(0, 5), 70.0)
                .unit("den", ActuatorState::idle(0, 5), 70.0),
        );

        let report = updater(
            vec![thermostat("attic", "turbo"), thermostat("den", "off")],
            transport.clone(),
            DispatchPolicy::FullState,
        )
        .run_once()
        .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.units[0].id, "attic");
        assert_eq!(failure_kind(&report.units[0]), Some(ErrorKind::InvalidMode));
        assert_eq!(
            transport.writes(),
            vec![(hvac_url("den"), ActuatorState::idle(1, 5))]
        );
    }

    #[tokio::test]
    async fn unreachable_and_rejecting_units_are_recorded() {
        let mut transport = FakeTransport::default().unit("den", ActuatorState::idle(0, 5), 60.0);
        transport.failing_writes.push(hvac_url("den"));
        let transport = Arc::new(transport);

        let report = updater(
            vec![thermostat("garage", "heat"), thermostat("den", "heat")],
            transport,
            DispatchPolicy::FullState,
        )
        .run_once()
        .await;

        assert_eq!(report.failed, 2);
        assert_eq!(failure_kind(&report.units[0]), Some(ErrorKind::Transport));
        assert_eq!(failure_kind(&report.units[1]), Some(ErrorKind::Transport));
    }

    #[tokio::test]
    async fn malformed_config_is_a_configuration_failure() {
        let transport =
            Arc::new(FakeTransport::default().unit("shed", ActuatorState::idle(0, 5), 70.0));
        let mut broken = thermostat("shed", "eco");
        broken.eco_min_temperature = 90;

        let report = updater(vec![broken], transport.clone(), DispatchPolicy::FullState)
            .run_once()
            .await;

        assert_eq!(failure_kind(&report.units[0]), Some(ErrorKind::Configuration));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn undecodable_stored_record_fails_only_that_unit() {
        let dir = std::env::temp_dir().join(format!(
            "hvac-updater-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let mut bad = serde_json::to_value(thermostat("attic", "heat")).unwrap();
        bad["tolerance"] = serde_json::json!(1.5);
        let entries = serde_json::json!([thermostat("den", "off"), bad]);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("thermostats.json"), entries.to_string())
            .await
            .unwrap();

        let transport = Arc::new(
            FakeTransport::default()
                .unit("den", ActuatorState::idle(0, 5), 70.0)
                .unit("attic", ActuatorState::idle(0, 5), 60.0),
        );
        let report = Updater::new(
            Arc::new(JsonFileStore::new(&dir)),
            transport.clone(),
            options(DispatchPolicy::FullState),
        )
        .run_once()
        .await;

        assert_eq!(report.list_error, None);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.units[1].id, "attic");
        assert_eq!(failure_kind(&report.units[1]), Some(ErrorKind::Configuration));
        assert_eq!(
            transport.writes(),
            vec![(hvac_url("den"), ActuatorState::idle(1, 5))]
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_unit_times_out_without_blocking_others() {
        let mut transport = FakeTransport::default()
            .unit("slow", ActuatorState::idle(0, 5), 70.0)
            .unit("den", ActuatorState::idle(0, 5), 70.0);
        transport.stalled.push(hvac_url("slow"));
        let transport = Arc::new(transport);

        let report = updater(
            vec![thermostat("slow", "off"), thermostat("den", "off")],
            transport.clone(),
            DispatchPolicy::FullState,
        )
        .run_once()
        .await;

        assert_eq!(failure_kind(&report.units[0]), Some(ErrorKind::Transport));
        assert!(report.units[1].is_success());
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_state_is_not_written() {
        // Off with the fan forced on keeps venting; only off_time moves.
        let transport =
            Arc::new(FakeTransport::default().unit("den", ActuatorState::vent(1, 5), 70.0));
        let mut config = thermostat("den", "off");
        config.fan = "on".to_string();

        let report = updater(vec![config], transport.clone(), DispatchPolicy::ActuationOnly)
            .run_once()
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.dispatched, 0);
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn full_state_policy_writes_off_time_progress() {
        let transport =
            Arc::new(FakeTransport::default().unit("den", ActuatorState::vent(1, 5), 70.0));
        let mut config = thermostat("den", "off");
        config.fan = "on".to_string();

        let report = updater(vec![config], transport.clone(), DispatchPolicy::FullState)
            .run_once()
            .await;

        assert_eq!(report.dispatched, 1);
        assert_eq!(
            transport.writes(),
            vec![(hvac_url("den"), ActuatorState::vent(2, 5))]
        );
    }

    #[tokio::test]
    async fn dispatch_skips_identical_state() {
        let transport = FakeTransport::default();
        let state = ActuatorState::heating(4, 5);

        let written = dispatch(
            &transport,
            "http://den/hvac",
            &state,
            &state,
            options(DispatchPolicy::FullState),
        )
        .await
        .unwrap();

        assert!(!written);
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn empty_store_gives_empty_report() {
        let report = updater(
            Vec::new(),
            Arc::new(FakeTransport::default()),
            DispatchPolicy::FullState,
        )
        .run_once()
        .await;

        assert!(report.units.is_empty());
        assert_eq!(report.list_error, None);
    }

    #[test]
    fn options_follow_runtime_config() {
        let runtime = RuntimeConfig {
            request_timeout_ms: 2_500,
            dispatch_policy: DispatchPolicy::ActuationOnly,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            UpdaterOptions::from(&runtime),
            UpdaterOptions {
                request_timeout: Duration::from_millis(2_500),
                dispatch_policy: DispatchPolicy::ActuationOnly,
            }
        );
    }
}
