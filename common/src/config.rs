use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Relay pin sentinel that disables all physical I/O for a room.
pub const MOCK_PIN: u64 = 999;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub relay_pin: u64,
    pub temp_pin: u64,
    pub temp_id: String,
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

fn default_tick_seconds() -> u64 {
    3
}

impl RoomConfig {
    pub fn is_mocked(&self) -> bool {
        self.relay_pin == MOCK_PIN
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default = "default_state_publish_seconds")]
    pub state_publish_seconds: u64,
}

fn default_mqtt_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "heatbridge".to_string()
}

fn default_state_publish_seconds() -> u64 {
    10
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            user: String::new(),
            pass: String::new(),
            client_id: default_mqtt_client_id(),
            state_publish_seconds: default_state_publish_seconds(),
        }
    }
}

/// Static configuration, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub rooms: BTreeMap<String, RoomConfig>,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub weather_url: Option<String>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("room {0:?} is not present in the static configuration")]
    UnknownRoom(String),
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }

    /// Looks up one room's hardware mapping. A missing room is an
    /// unrecoverable misconfiguration.
    pub fn room(&self, name: &str) -> Result<&RoomConfig, ConfigError> {
        self.rooms
            .get(name)
            .ok_or_else(|| ConfigError::UnknownRoom(name.to_string()))
    }

    pub fn sanitize(&mut self) {
        for room in self.rooms.values_mut() {
            room.tick_seconds = room.tick_seconds.max(1);
        }
        self.mqtt.state_publish_seconds = self.mqtt.state_publish_seconds.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> BridgeConfig {
        serde_json::from_str(
            r#"{
                "rooms": {
                    "LivingRoom": {
                        "relay_pin": 17,
                        "temp_pin": 4,
                        "temp_id": "0316a279a6ff",
                        "tick_seconds": 2
                    },
                    "SunRoom": {
                        "relay_pin": 999,
                        "temp_pin": 4,
                        "temp_id": "XXXXXXXXXXX"
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_rooms_and_applies_defaults() {
        let config = sample();

        let living = config.room("LivingRoom").unwrap();
        assert_eq!(living.relay_pin, 17);
        assert_eq!(living.tick_seconds, 2);

        let sun = config.room("SunRoom").unwrap();
        assert_eq!(sun.tick_seconds, 3);
        assert!(sun.is_mocked());

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.mqtt.state_publish_seconds, 10);
    }

    #[test]
    fn missing_room_is_an_error() {
        let config = sample();
        assert!(matches!(
            config.room("Basement"),
            Err(ConfigError::UnknownRoom(_))
        ));
    }

    #[test]
    fn sanitize_clamps_zero_periods() {
        let mut config = sample();
        config.rooms.get_mut("LivingRoom").unwrap().tick_seconds = 0;
        config.mqtt.state_publish_seconds = 0;
        config.sanitize();

        assert_eq!(config.room("LivingRoom").unwrap().tick_seconds, 1);
        assert_eq!(config.mqtt.state_publish_seconds, 1);
    }
}
