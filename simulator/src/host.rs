use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use hvac_common::{ActuatorState, TemperatureReading, SIM_HVAC, SIM_TEMPERATURE};

use crate::unit::SimulatedUnit;

#[derive(Clone)]
struct SimState {
    unit: Arc<Mutex<SimulatedUnit>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = std::env::var("SIM_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8090);
    let min_off_time = std::env::var("SIM_MIN_OFF_TIME")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(5);
    let start_temp = std::env::var("SIM_START_TEMP")
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(72.0);
    let outdoor_temp = std::env::var("SIM_OUTDOOR_TEMP")
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(80.0);

    let state = SimState {
        unit: Arc::new(Mutex::new(SimulatedUnit::new(
            min_off_time,
            start_temp,
            outdoor_temp,
        ))),
    };

    spawn_thermal_loop(state.clone());

    let app = Router::new()
        .route(SIM_HVAC, get(handle_get_hvac).put(handle_put_hvac))
        .route(SIM_TEMPERATURE, get(handle_get_temperature))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind simulator at {addr}"))?;

    info!("simulated hvac unit on http://{addr} (min_off_time {min_off_time})");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_thermal_loop(state: SimState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            state.unit.lock().await.step();
        }
    });
}

async fn handle_get_hvac(State(state): State<SimState>) -> impl IntoResponse {
    Json(state.unit.lock().await.state())
}

async fn handle_put_hvac(
    State(state): State<SimState>,
    Json(requested): Json<ActuatorState>,
) -> impl IntoResponse {
    let mut unit = state.unit.lock().await;
    match unit.apply(requested) {
        Ok(()) => {
            let applied = unit.state();
            info!(
                "hvac set to {} at {:.1} (off_time {})",
                applied.actuation().as_str(),
                unit.temperature(),
                applied.off_time
            );
            Json(applied).into_response()
        }
        Err(message) => {
            warn!("rejected hvac state {requested:?}: {message}");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: message.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn handle_get_temperature(State(state): State<SimState>) -> impl IntoResponse {
    let temperature = state.unit.lock().await.temperature();
    Json(TemperatureReading {
        temperature: (temperature * 10.0).round() / 10.0,
    })
}
