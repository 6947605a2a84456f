use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use tokio::sync::Mutex;

use heatbridge_common::RelayState;

/// One room's label set. Created on registration, updated in place,
/// never removed.
#[derive(Debug, Clone, Default)]
struct RoomCell {
    current_temp: Option<f64>,
    target_temp: Option<f64>,
    heat_status: u8,
    sensor_errors: u64,
}

/// Process-wide telemetry registry, scraped through the HTTP surface.
/// Temperatures are recorded in the display unit; conversion is the
/// caller's job at the boundary.
pub struct Telemetry {
    rooms: Mutex<BTreeMap<String, RoomCell>>,
}

impl Telemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(BTreeMap::new()),
        })
    }

    pub async fn register_room(&self, room: &str, target_temp: f64) {
        let mut rooms = self.rooms.lock().await;
        let cell = rooms.entry(room.to_string()).or_default();
        cell.target_temp = Some(target_temp);
    }

    /// Gauge updates for a completed tick. Runs every tick regardless of
    /// status log de-duplication.
    pub async fn record_tick(&self, room: &str, current: f64, target: f64, heat: RelayState) {
        let mut rooms = self.rooms.lock().await;
        let cell = rooms.entry(room.to_string()).or_default();
        cell.current_temp = Some(current);
        cell.target_temp = Some(target);
        cell.heat_status = heat.bit();
    }

    pub async fn record_target(&self, room: &str, target: f64) {
        let mut rooms = self.rooms.lock().await;
        let cell = rooms.entry(room.to_string()).or_default();
        cell.target_temp = Some(target);
    }

    /// Counts a failed sensor read. The tick's gauges stay untouched.
    pub async fn record_sensor_error(&self, room: &str) {
        let mut rooms = self.rooms.lock().await;
        let cell = rooms.entry(room.to_string()).or_default();
        cell.sensor_errors += 1;
    }

    pub async fn sensor_errors(&self, room: &str) -> u64 {
        let rooms = self.rooms.lock().await;
        rooms.get(room).map(|cell| cell.sensor_errors).unwrap_or(0)
    }

    /// Prometheus text exposition of all four metric families.
    pub async fn render(&self) -> String {
        let rooms = self.rooms.lock().await;
        let mut out = String::new();

        out.push_str("# HELP current_temperature Current room temperature in display units.\n");
        out.push_str("# TYPE current_temperature gauge\n");
        for (room, cell) in rooms.iter() {
            if let Some(current) = cell.current_temp {
                let _ = writeln!(
                    out,
                    "current_temperature{{room=\"{room}\",heat_status=\"{}\"}} {current}",
                    cell.heat_status
                );
            }
        }

        out.push_str("# HELP target_temperature Requested room temperature in display units.\n");
        out.push_str("# TYPE target_temperature gauge\n");
        for (room, cell) in rooms.iter() {
            if let Some(target) = cell.target_temp {
                let _ = writeln!(
                    out,
                    "target_temperature{{room=\"{room}\",heat_status=\"{}\"}} {target}",
                    cell.heat_status
                );
            }
        }

        out.push_str("# HELP heat_status Relay state per room, 1 when heating.\n");
        out.push_str("# TYPE heat_status gauge\n");
        for (room, cell) in rooms.iter() {
            let _ = writeln!(out, "heat_status{{room=\"{room}\"}} {}", cell.heat_status);
        }

        out.push_str("# HELP reset_error_count Failed sensor reads per room.\n");
        out.push_str("# TYPE reset_error_count counter\n");
        for (room, cell) in rooms.iter() {
            let _ = writeln!(
                out,
                "reset_error_count{{room=\"{room}\"}} {}",
                cell.sensor_errors
            );
        }

        out
    }
}
