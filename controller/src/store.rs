use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use hvac_common::{ControlError, RuntimeConfig, ThermostatConfig};

/// A stored entry that does not decode as a thermostat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// The entry's `uuid` when it has one, otherwise `#<position>`.
    pub id: String,
    pub area: String,
    pub error: ControlError,
}

impl MalformedRecord {
    fn from_value(position: usize, value: &Value, err: serde_json::Error) -> Self {
        let id = value
            .get("uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{position}"));
        let area = value
            .get("area")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            area,
            error: ControlError::Configuration(format!("malformed stored record: {err}")),
        }
    }
}

pub type StoredRecord = Result<ThermostatConfig, MalformedRecord>;

/// Keyed store of thermostat records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every stored entry in order. An undecodable entry is returned in place
    /// as a [`MalformedRecord`] rather than failing the listing.
    async fn list(&self) -> anyhow::Result<Vec<StoredRecord>>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<ThermostatConfig>>;

    /// Inserts the record, or replaces the one with the same id in place.
    async fn put(&self, config: ThermostatConfig) -> anyhow::Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> anyhow::Result<bool>;
}

fn upsert(records: &mut Vec<ThermostatConfig>, config: ThermostatConfig) {
    match records.iter_mut().find(|record| record.id == config.id) {
        Some(existing) => *existing = config,
        None => records.push(config),
    }
}

fn remove(records: &mut Vec<ThermostatConfig>, id: &str) -> bool {
    let before = records.len();
    records.retain(|record| record.id != id);
    records.len() != before
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get("uuid").and_then(Value::as_str)
}

fn decode(position: usize, entry: &Value) -> StoredRecord {
    ThermostatConfig::deserialize(entry)
        .map_err(|err| MalformedRecord::from_value(position, entry, err))
}

/// Thermostat records kept as one JSON array on disk.
///
/// Entries are held as raw JSON between reads and writes so an entry that no
/// longer decodes survives every other write untouched and can still be deleted.
#[derive(Clone)]
pub struct JsonFileStore {
    runtime_path: Arc<PathBuf>,
    thermostats_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            thermostats_path: Arc::new(data_dir.join("thermostats.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hvac"));
        Self::new(data_dir)
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("malformed runtime config {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_entries(&self) -> anyhow::Result<Vec<Value>> {
        match tokio::fs::read(self.thermostats_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice(&raw).with_context(|| {
                format!(
                    "thermostat store {} is not a JSON array",
                    self.thermostats_path.display()
                )
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_entries(&self, entries: &[Value]) -> anyhow::Result<()> {
        let path = self.thermostats_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn list(&self) -> anyhow::Result<Vec<StoredRecord>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(entries
            .iter()
            .enumerate()
            .map(|(position, entry)| decode(position, entry))
            .collect())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<ThermostatConfig>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        match entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry_id(entry) == Some(id))
        {
            Some((position, entry)) => decode(position, entry)
                .map(Some)
                .map_err(|malformed| anyhow::anyhow!("thermostat {id}: {}", malformed.error)),
            None => Ok(None),
        }
    }

    async fn put(&self, config: ThermostatConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let encoded = serde_json::to_value(&config)?;
        match entries
            .iter_mut()
            .find(|entry| entry_id(entry) == Some(config.id.as_str()))
        {
            Some(existing) => *existing = encoded,
            None => entries.push(encoded),
        }
        self.write_entries(&entries).await
    }

    async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let before = entries.len();
        entries.retain(|entry| entry_id(entry) != Some(id));
        let removed = entries.len() != before;
        if removed {
            self.write_entries(&entries).await?;
        }
        Ok(removed)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<ThermostatConfig>>>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<ThermostatConfig>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list(&self) -> anyhow::Result<Vec<StoredRecord>> {
        Ok(self.records.lock().await.iter().cloned().map(Ok).collect())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<ThermostatConfig>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    async fn put(&self, config: ThermostatConfig) -> anyhow::Result<()> {
        upsert(&mut *self.records.lock().await, config);
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        Ok(remove(&mut *self.records.lock().await, id))
    }
}
