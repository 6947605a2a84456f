pub mod config;
pub mod control;
pub mod topics;
pub mod types;

pub use config::{BridgeConfig, ConfigError, MqttConfig, RoomConfig, MOCK_PIN};
pub use control::{ControlEngine, Decision, DEADBAND};
pub use types::{display_temperature, HeatMode, RelayState, RoomStatus, TickStatus};
