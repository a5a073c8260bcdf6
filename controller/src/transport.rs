use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;

use hvac_common::{ActuatorState, ControlError, TemperatureReading};

/// The three calls a control cycle makes against a unit.
#[async_trait]
pub trait HvacTransport: Send + Sync {
    async fn get_actuator_state(&self, endpoint: &str) -> Result<ActuatorState, ControlError>;

    async fn get_temperature(&self, endpoint: &str) -> Result<f64, ControlError>;

    /// Replaces the unit's whole actuator state.
    async fn set_actuator_state(
        &self,
        endpoint: &str,
        state: &ActuatorState,
    ) -> Result<(), ControlError>;
}

/// JSON over HTTP: `GET` reads, `PUT` replaces.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build hvac http client")?;
        Ok(Self { client })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, ControlError> {
        self.client
            .get(endpoint)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ControlError::transport(endpoint, err))?
            .json::<T>()
            .await
            .map_err(|err| ControlError::transport(endpoint, format!("invalid body: {err}")))
    }
}

#[async_trait]
impl HvacTransport for HttpTransport {
    async fn get_actuator_state(&self, endpoint: &str) -> Result<ActuatorState, ControlError> {
        self.get_json(endpoint).await
    }

    async fn get_temperature(&self, endpoint: &str) -> Result<f64, ControlError> {
        let reading: TemperatureReading = self.get_json(endpoint).await?;
        if !reading.temperature.is_finite() {
            return Err(ControlError::transport(
                endpoint,
                "temperature reading is not a finite number",
            ));
        }
        Ok(reading.temperature)
    }

    async fn set_actuator_state(
        &self,
        endpoint: &str,
        state: &ActuatorState,
    ) -> Result<(), ControlError> {
        self.client
            .put(endpoint)
            .json(state)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ControlError::transport(endpoint, err))?;
        Ok(())
    }
}
