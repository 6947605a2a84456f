use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use heatbridge_common::HeatMode;

/// Auxiliary key holding the weather cache, alongside the room keys.
const AUX_KEY: &str = "_aux";

/// Persisted control state for one room. Records written by older
/// deployments may lack the target fields; they default to 70/OFF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub relay_pin: u64,
    pub temp_pin: u64,
    pub temp_id: String,
    #[serde(default = "default_target_temp")]
    pub target_temp: f64,
    #[serde(default)]
    pub target_state: HeatMode,
}

fn default_target_temp() -> f64 {
    70.0
}

impl RoomRecord {
    /// First-run record for a freshly configured room.
    pub fn initial(config: &heatbridge_common::RoomConfig) -> Self {
        Self {
            relay_pin: config.relay_pin,
            temp_pin: config.temp_pin,
            temp_id: config.temp_id.clone(),
            target_temp: default_target_temp(),
            target_state: HeatMode::Off,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherCache {
    pub weather_ts: String,
    pub outdoor_temp: Option<f64>,
}

/// Durable key-value store: one JSON file per key under the data
/// directory, shared by every room controller. Writes are serialized
/// behind one lock; distinct keys never collide on content.
pub struct StateStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load_room(&self, room: &str) -> anyhow::Result<Option<RoomRecord>> {
        self.load_json(room).await
    }

    pub async fn save_room(&self, room: &str, record: &RoomRecord) -> anyhow::Result<()> {
        self.save_json(room, record).await
    }

    pub async fn load_weather(&self) -> anyhow::Result<Option<WeatherCache>> {
        self.load_json(AUX_KEY).await
    }

    pub async fn save_weather(&self, cache: &WeatherCache) -> anyhow::Result<()> {
        self.save_json(AUX_KEY, cache).await
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    async fn load_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.path_for(key)).await {
            Ok(raw) => {
                let value = serde_json::from_slice(&raw)
                    .with_context(|| format!("corrupt state record for key {key:?}"))?;
                Ok(Some(value))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(anyhow::Error::from(err).context(format!("failed to read state key {key:?}")))
            }
        }
    }

    async fn save_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write state key {key:?}"))?;
        Ok(())
    }
}
