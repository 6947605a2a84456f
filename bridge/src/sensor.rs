use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

/// Configured sensor id that reports a fixed reading instead of touching
/// the bus, for rooms with no thermometer attached yet.
pub const FAKE_SENSOR_ID: &str = "XXXXXXXXXXX";

const FAKE_SENSOR_TEMP: f64 = 21.0;

const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SensorHandle {
    pub id: String,
    pub(crate) path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no attached sensor matches id {0:?}")]
    NoMatch(String),
    #[error("sensor read timed out")]
    Timeout,
    #[error("sensor reported a failed CRC")]
    CrcFailed,
    #[error("malformed sensor payload: {0}")]
    Malformed(String),
    #[error("sensor i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Enumerates attached temperature sensors and reads them. Listing never
/// fails just because nothing is attached; an empty bus is a skip
/// condition for the caller.
#[async_trait]
pub trait SensorBus: Send + Sync {
    async fn list_sensors(&self) -> Result<Vec<SensorHandle>, SensorError>;
    async fn read_temperature(&self, handle: &SensorHandle) -> Result<f64, SensorError>;
}

/// Kernel w1 subsystem bus: every slave shows up as a directory named
/// `<family>-<serial>` with a `w1_slave` file holding the raw conversion.
pub struct W1Bus {
    root: PathBuf,
    read_timeout: Duration,
}

impl W1Bus {
    pub fn new() -> Self {
        Self::with_root(W1_DEVICES_DIR)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Default for W1Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorBus for W1Bus {
    async fn list_sensors(&self) -> Result<Vec<SensorHandle>, SensorError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            // No w1 bus present at all: same as an empty sensor list.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut sensors = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(serial) = slave_serial(name) else {
                continue;
            };
            sensors.push(SensorHandle {
                id: serial.to_string(),
                path: entry.path(),
            });
        }

        sensors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sensors)
    }

    async fn read_temperature(&self, handle: &SensorHandle) -> Result<f64, SensorError> {
        let slave = handle.path.join("w1_slave");
        let raw = tokio::time::timeout(self.read_timeout, tokio::fs::read_to_string(slave))
            .await
            .map_err(|_| SensorError::Timeout)??;
        parse_w1_payload(&raw)
    }
}

/// `28-0316a279a6ff` → `0316a279a6ff`; bus masters and anything not
/// shaped like a slave id are skipped.
fn slave_serial(name: &str) -> Option<&str> {
    let (family, serial) = name.split_once('-')?;
    if family.len() != 2 || !family.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(serial)
}

fn parse_w1_payload(raw: &str) -> Result<f64, SensorError> {
    let mut lines = raw.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| SensorError::Malformed("empty payload".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::CrcFailed);
    }

    let data_line = lines
        .next()
        .ok_or_else(|| SensorError::Malformed("missing temperature line".to_string()))?;
    let (_, milli) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| SensorError::Malformed(format!("no t= marker in {data_line:?}")))?;
    let milli: i64 = milli
        .trim()
        .parse()
        .map_err(|_| SensorError::Malformed(format!("unparsable temperature {milli:?}")))?;

    Ok(milli as f64 / 1000.0)
}

/// Resolves a room's configured sensor id to a reading. Exactly one
/// attached sensor may match; every other sensor on the bus is ignored.
pub async fn read_room_temperature(bus: &dyn SensorBus, temp_id: &str) -> Result<f64, SensorError> {
    if temp_id == FAKE_SENSOR_ID {
        return Ok(FAKE_SENSOR_TEMP);
    }

    let sensors = bus.list_sensors().await?;
    let handle = sensors
        .iter()
        .find(|sensor| sensor.id == temp_id)
        .ok_or_else(|| SensorError::NoMatch(temp_id.to_string()))?;

    bus.read_temperature(handle).await
}

impl SensorHandle {
    #[cfg(test)]
    pub(crate) fn synthetic(id: &str) -> Self {
        Self {
            id: id.to_string(),
            path: PathBuf::from("/dev/null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_PAYLOAD: &str =
        "3b 01 4b 46 7f ff 0c 10 d8 : crc=d8 YES\n3b 01 4b 46 7f ff 0c 10 d8 t=19687\n";
    const BAD_CRC_PAYLOAD: &str =
        "3b 01 4b 46 7f ff 0c 10 d8 : crc=d8 NO\n3b 01 4b 46 7f ff 0c 10 d8 t=19687\n";

    #[test]
    fn parses_milli_degrees() {
        assert_eq!(parse_w1_payload(GOOD_PAYLOAD).unwrap(), 19.687);
    }

    #[test]
    fn parses_negative_readings() {
        let payload = "aa : crc=aa YES\naa t=-1250\n";
        assert_eq!(parse_w1_payload(payload).unwrap(), -1.25);
    }

    #[test]
    fn rejects_failed_crc() {
        assert!(matches!(
            parse_w1_payload(BAD_CRC_PAYLOAD),
            Err(SensorError::CrcFailed)
        ));
    }

    #[test]
    fn rejects_truncated_payloads() {
        assert!(matches!(
            parse_w1_payload("aa : crc=aa YES\n"),
            Err(SensorError::Malformed(_))
        ));
        assert!(matches!(
            parse_w1_payload(""),
            Err(SensorError::Malformed(_))
        ));
    }

    #[test]
    fn serial_extraction_skips_bus_masters() {
        assert_eq!(slave_serial("28-0316a279a6ff"), Some("0316a279a6ff"));
        assert_eq!(slave_serial("10-000802bean"), None);
        assert_eq!(slave_serial("w1_bus_master1"), None);
        assert_eq!(slave_serial("28-"), None);
    }

    #[tokio::test]
    async fn missing_bus_directory_lists_empty() {
        let bus = W1Bus::with_root("/nonexistent/heatbridge-w1");
        assert!(bus.list_sensors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_and_reads_sensors_from_bus_directory() {
        let root = std::env::temp_dir().join(format!("heatbridge-w1-{}", std::process::id()));
        let device = root.join("28-0316a279a6ff");
        tokio::fs::create_dir_all(&device).await.unwrap();
        tokio::fs::write(device.join("w1_slave"), GOOD_PAYLOAD)
            .await
            .unwrap();

        let bus = W1Bus::with_root(&root);
        let sensors = bus.list_sensors().await.unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].id, "0316a279a6ff");

        let reading = read_room_temperature(&bus, "0316a279a6ff").await.unwrap();
        assert_eq!(reading, 19.687);

        let missing = read_room_temperature(&bus, "feedfacecafe").await;
        assert!(matches!(missing, Err(SensorError::NoMatch(_))));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn fake_sensor_id_reports_fixed_reading() {
        let bus = W1Bus::with_root("/nonexistent/heatbridge-w1");
        let reading = read_room_temperature(&bus, FAKE_SENSOR_ID).await.unwrap();
        assert_eq!(reading, 21.0);
    }
}
