use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::{net::TcpListener, sync::Mutex, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use hvac_common::{
    LoopReport, NewThermostat, RuntimeConfig, ThermostatUpdate, API_REPORT, API_THERMOSTAT,
    API_THERMOSTATS, API_UPDATE,
};

use crate::{
    store::{ConfigStore, JsonFileStore},
    transport::HttpTransport,
    updater::{Updater, UpdaterOptions},
};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ConfigStore>,
    updater: Updater,
    last_report: Arc<Mutex<Option<LoopReport>>>,
    // Held for the whole tick so periodic and requested ticks never overlap.
    tick_lock: Arc<Mutex<()>>,
    run_on_update: bool,
}

impl AppState {
    fn new(store: Arc<dyn ConfigStore>, updater: Updater, run_on_update: bool) -> Self {
        Self {
            store,
            updater,
            last_report: Arc::new(Mutex::new(None)),
            tick_lock: Arc::new(Mutex::new(())),
            run_on_update,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = JsonFileStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let transport = HttpTransport::new(Duration::from_millis(runtime.request_timeout_ms))?;
    let store: Arc<dyn ConfigStore> = Arc::new(store);
    let updater = Updater::new(
        store.clone(),
        Arc::new(transport),
        UpdaterOptions::from(&runtime),
    );
    let app_state = AppState::new(store, updater, runtime.run_on_update);

    spawn_control_loop(
        app_state.clone(),
        Duration::from_millis(runtime.tick_interval_ms),
    );

    let app = router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        "controller listening on http://{addr} (tick {}ms, dispatch {})",
        runtime.tick_interval_ms,
        runtime.dispatch_policy.as_str()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route(
            API_THERMOSTATS,
            get(handle_list_thermostats).post(handle_create_thermostat),
        )
        .route(
            API_THERMOSTAT,
            get(handle_get_thermostat)
                .put(handle_update_thermostat)
                .delete(handle_delete_thermostat),
        )
        .route(API_UPDATE, post(handle_run_update))
        .route(API_REPORT, get(handle_get_report))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Some(value) = std::env::var("HVAC_TICK_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        runtime.tick_interval_ms = value;
    }
    if let Some(value) = std::env::var("HVAC_REQUEST_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        runtime.request_timeout_ms = value;
    }
    if let Some(value) = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.http_port = value;
    }
    if let Ok(value) = std::env::var("HVAC_DISPATCH_POLICY") {
        match value.parse() {
            Ok(policy) => runtime.dispatch_policy = policy,
            Err(err) => warn!("ignoring HVAC_DISPATCH_POLICY: {err}"),
        }
    }
}

fn spawn_control_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            run_tick(&app_state).await;
        }
    });
}

async fn run_tick(app_state: &AppState) -> LoopReport {
    let _tick = app_state.tick_lock.lock().await;
    let report = app_state.updater.run_once().await;
    *app_state.last_report.lock().await = Some(report.clone());
    report
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("controller shutting down");
}

async fn handle_list_thermostats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list().await {
        Ok(records) => {
            let records: Vec<_> = records
                .into_iter()
                .filter_map(|record| match record {
                    Ok(config) => Some(config),
                    Err(malformed) => {
                        warn!(
                            uuid = %malformed.id,
                            "omitting stored record: {}",
                            malformed.error
                        );
                        None
                    }
                })
                .collect();
            Json(records).into_response()
        }
        Err(err) => {
            warn!("failed to list thermostats: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load thermostats",
            )
        }
    }
}

async fn handle_get_thermostat(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&uuid).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Thermostat not found"),
        Err(err) => {
            warn!("failed to load thermostat {uuid}: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load thermostat",
            )
        }
    }
}

async fn handle_create_thermostat(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let draft = match NewThermostat::from_json(&body) {
        Ok(draft) => draft,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let record = draft.into_config(Uuid::new_v4().simple().to_string());
    if let Err(err) = state.store.put(record.clone()).await {
        warn!("failed to persist new thermostat: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist thermostat",
        );
    }

    info!(uuid = %record.id, area = %record.area, "thermostat created");
    Json(record).into_response()
}

async fn handle_update_thermostat(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let update = ThermostatUpdate::from_json(&body);
    if update.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid update request");
    }

    let mut record = match state.store.get(&uuid).await {
        Ok(Some(record)) => record,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Thermostat not found"),
        Err(err) => {
            warn!("failed to load thermostat {uuid} for update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load thermostat",
            );
        }
    };

    update.apply(&mut record);
    if let Err(err) = record.validate() {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    if let Err(err) = state.store.put(record).await {
        warn!("failed to persist thermostat {uuid}: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist thermostat",
        );
    }

    if state.run_on_update {
        let tick_state = state.clone();
        tokio::spawn(async move {
            run_tick(&tick_state).await;
        });
    }

    Json(MessageBody {
        message: "Thermostat updated",
    })
    .into_response()
}

async fn handle_delete_thermostat(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&uuid).await {
        Ok(true) => Json(MessageBody {
            message: "Thermostat deleted.",
        })
        .into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Thermostat not found"),
        Err(err) => {
            warn!("failed to delete thermostat {uuid}: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete thermostat",
            )
        }
    }
}

async fn handle_run_update(State(state): State<AppState>) -> impl IntoResponse {
    Json(run_tick(&state).await)
}

async fn handle_get_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.last_report.lock().await.clone() {
        Some(report) => Json(report).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No control tick has run yet"),
    }
}

fn parse_body(raw: &[u8]) -> Result<Value, axum::response::Response> {
    serde_json::from_slice(raw).map_err(|err| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Request body is not valid JSON: {err}"),
        )
    })
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
