use serde::{Deserialize, Serialize};

/// User-requested heating mode. Persisted and transported as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum HeatMode {
    Off,
    Heat,
}

impl HeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
        }
    }

    /// Parses a mode written by a user surface; accepts the name or the
    /// wire digit.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "HEAT" | "1" => Some(Self::Heat),
            "OFF" | "0" => Some(Self::Off),
            _ => None,
        }
    }
}

impl Default for HeatMode {
    fn default() -> Self {
        Self::Off
    }
}

impl From<HeatMode> for u8 {
    fn from(mode: HeatMode) -> Self {
        match mode {
            HeatMode::Off => 0,
            HeatMode::Heat => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid heating mode {0}, expected 0 or 1")]
pub struct InvalidMode(pub u8);

impl TryFrom<u8> for HeatMode {
    type Error = InvalidMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Heat),
            other => Err(InvalidMode(other)),
        }
    }
}

/// Physical state of the heating relay, as read back from the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Off,
    On,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn bit(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Self::Off
        } else {
            Self::On
        }
    }
}

/// Outcome of one control-loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    NotRequested,
    TurningOff,
    StayingOn,
    TurningOn,
    StayingOff,
}

impl TickStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRequested => "HEAT OFF - NOT REQUESTED",
            Self::TurningOff => "HEAT ON - TURNING OFF",
            Self::StayingOn => "HEAT ON - STAYING ON",
            Self::TurningOn => "HEAT OFF - TURNING ON",
            Self::StayingOff => "HEAT OFF - STAYING OFF",
        }
    }
}

/// Snapshot of a room published over HTTP and MQTT.
///
/// Temperatures are already converted to the display unit.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room: String,
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f64>,
    #[serde(rename = "targetTemp")]
    pub target_temp: f64,
    pub mode: &'static str,
    #[serde(rename = "heatOn")]
    pub heat_on: bool,
    pub status: Option<&'static str>,
    #[serde(rename = "sensorErrors")]
    pub sensor_errors: u64,
}

/// Converts a native (Celsius) temperature to the display unit
/// (Fahrenheit), rounded to two decimals. Conversion happens only at the
/// log/telemetry boundary; hysteresis always compares native values.
pub fn display_temperature(native: f64) -> f64 {
    ((9.0 / 5.0 * native + 32.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_roundtrips_through_wire_encoding() {
        let encoded = serde_json::to_string(&HeatMode::Heat).unwrap();
        assert_eq!(encoded, "1");

        let decoded: HeatMode = serde_json::from_str("0").unwrap();
        assert_eq!(decoded, HeatMode::Off);
    }

    #[test]
    fn mode_rejects_unknown_values() {
        assert!(serde_json::from_str::<HeatMode>("2").is_err());
    }

    #[test]
    fn mode_parse_accepts_names_and_digits() {
        assert_eq!(HeatMode::parse("HEAT"), Some(HeatMode::Heat));
        assert_eq!(HeatMode::parse("heat"), Some(HeatMode::Heat));
        assert_eq!(HeatMode::parse("1"), Some(HeatMode::Heat));
        assert_eq!(HeatMode::parse("OFF"), Some(HeatMode::Off));
        assert_eq!(HeatMode::parse("0"), Some(HeatMode::Off));
        assert_eq!(HeatMode::parse("AUTO"), None);
    }

    #[test]
    fn display_conversion_matches_reference_value() {
        assert_eq!(display_temperature(21.0), 69.8);
    }

    #[test]
    fn display_conversion_rounds_to_two_decimals() {
        assert_eq!(display_temperature(21.13), 70.03);
    }
}
