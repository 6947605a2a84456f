use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use heatbridge_common::{
    display_temperature, BridgeConfig, ControlEngine, HeatMode, RoomConfig, RoomStatus,
};

use crate::relay::{self, Relay};
use crate::sensor::{self, SensorBus};
use crate::store::{RoomRecord, StateStore};
use crate::telemetry::Telemetry;

/// Characteristic writes arriving from the accessory-protocol surface
/// (HTTP, MQTT). Implemented by the room controller and handed to the
/// transport glue at construction; no effect on the actuator until the
/// next control-loop tick.
#[async_trait]
pub trait AccessoryCallbacks: Send + Sync {
    async fn on_target_temperature_changed(&self, value: f64) -> anyhow::Result<()>;
    async fn on_target_mode_changed(&self, value: HeatMode) -> anyhow::Result<()>;
    async fn on_current_temperature_changed(&self, value: f64);
}

struct RoomInner {
    engine: ControlEngine,
    /// Last good sensor reading, native unit. Never persisted.
    last_reading: Option<f64>,
}

/// Ties one room's persisted state, sensor, relay and control loop
/// together. Hardware pins and the sensor id come from static
/// configuration and never change at runtime.
pub struct RoomController {
    name: String,
    relay_pin: u64,
    temp_pin: u64,
    temp_id: String,
    tick_period: Duration,
    store: Arc<StateStore>,
    bus: Arc<dyn SensorBus>,
    relay: Box<dyn Relay>,
    telemetry: Arc<Telemetry>,
    inner: Mutex<RoomInner>,
    stopped: AtomicBool,
}

impl RoomController {
    pub async fn new(
        name: &str,
        config: &BridgeConfig,
        store: Arc<StateStore>,
        bus: Arc<dyn SensorBus>,
        telemetry: Arc<Telemetry>,
    ) -> anyhow::Result<Arc<Self>> {
        let room_config = config.room(name)?;
        let relay = relay::build(room_config.relay_pin).await?;
        Self::assemble(name, room_config, relay, store, bus, telemetry).await
    }

    pub(crate) async fn assemble(
        name: &str,
        room_config: &RoomConfig,
        relay: Box<dyn Relay>,
        store: Arc<StateStore>,
        bus: Arc<dyn SensorBus>,
        telemetry: Arc<Telemetry>,
    ) -> anyhow::Result<Arc<Self>> {
        let mut record = store
            .load_room(name)
            .await?
            .unwrap_or_else(|| RoomRecord::initial(room_config));

        // Static configuration wins over any stale persisted mapping.
        record.relay_pin = room_config.relay_pin;
        record.temp_pin = room_config.temp_pin;
        record.temp_id = room_config.temp_id.clone();
        store.save_room(name, &record).await?;

        telemetry
            .register_room(name, display_temperature(record.target_temp))
            .await;

        info!(
            "{name} controller ready (target {}, mode {})",
            record.target_temp,
            record.target_state.as_str()
        );

        Ok(Arc::new(Self {
            name: name.to_string(),
            relay_pin: record.relay_pin,
            temp_pin: record.temp_pin,
            temp_id: record.temp_id.clone(),
            tick_period: Duration::from_secs(room_config.tick_seconds),
            store,
            bus,
            relay,
            telemetry,
            inner: Mutex::new(RoomInner {
                engine: ControlEngine::new(record.target_temp, record.target_state),
                last_reading: None,
            }),
            stopped: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// One control-loop pass: read the sensor, reconcile the relay
    /// against the target with hysteresis, update telemetry. Sensor
    /// faults skip the pass entirely so a transient glitch never
    /// toggles the relay.
    pub async fn tick(&self) {
        if self.stopped.load(Ordering::Relaxed) {
            return;
        }

        let mut inner = self.inner.lock().await;

        let current = match sensor::read_room_temperature(self.bus.as_ref(), &self.temp_id).await {
            Ok(value) => value,
            Err(err) => {
                self.telemetry.record_sensor_error(&self.name).await;
                error!("{}: sensor read failed, skipping tick: {err}", self.name);
                return;
            }
        };

        if inner.last_reading != Some(current) {
            self.on_current_temperature_changed(current).await;
        }
        inner.last_reading = Some(current);

        let relay_state = match self.relay.get_state().await {
            Ok(state) => state,
            Err(err) => {
                error!("{}: relay readback failed, skipping tick: {err:#}", self.name);
                return;
            }
        };

        let decision = inner.engine.decide(relay_state, current);
        if decision.relay != relay_state {
            if let Err(err) = self.relay.set_state(decision.relay).await {
                error!("{}: relay write failed, skipping tick: {err:#}", self.name);
                return;
            }
        }

        let emit = inner.engine.note_status(decision.status);
        let current_display = display_temperature(current);
        let target_display = display_temperature(inner.engine.target_temp());

        self.telemetry
            .record_tick(&self.name, current_display, target_display, decision.relay)
            .await;

        if emit {
            info!("{} {}", self.name, decision.status.as_str());
        }
        info!(
            "{} (Current:{current_display}°F Target:{target_display}°F)",
            self.name
        );
    }

    pub async fn status(&self) -> RoomStatus {
        let inner = self.inner.lock().await;
        let heat_on = match self.relay.get_state().await {
            Ok(state) => state.is_on(),
            Err(err) => {
                warn!("{}: relay readback failed in status: {err:#}", self.name);
                false
            }
        };

        RoomStatus {
            room: self.name.clone(),
            current_temp: inner.last_reading.map(display_temperature),
            target_temp: display_temperature(inner.engine.target_temp()),
            mode: inner.engine.mode().as_str(),
            heat_on,
            status: inner.engine.last_status().map(|status| status.as_str()),
            sensor_errors: self.telemetry.sensor_errors(&self.name).await,
        }
    }

    /// Idempotent; a stopped controller ignores further ticks. The last
    /// persisted state is already durable since every setter persists
    /// before returning.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            info!("{} controller stopped", self.name);
        }
    }

    async fn persist(&self, engine: &ControlEngine) -> anyhow::Result<()> {
        let record = RoomRecord {
            relay_pin: self.relay_pin,
            temp_pin: self.temp_pin,
            temp_id: self.temp_id.clone(),
            target_temp: engine.target_temp(),
            target_state: engine.mode(),
        };
        self.store.save_room(&self.name, &record).await
    }
}

#[async_trait]
impl AccessoryCallbacks for RoomController {
    async fn on_target_temperature_changed(&self, value: f64) -> anyhow::Result<()> {
        if !value.is_finite() {
            anyhow::bail!("target temperature must be finite, got {value}");
        }

        let mut inner = self.inner.lock().await;
        if inner.engine.set_target_temp(value) {
            self.persist(&inner.engine).await?;
            self.telemetry
                .record_target(&self.name, display_temperature(value))
                .await;
            info!("{} target temperature changed to {value}", self.name);
        }
        Ok(())
    }

    async fn on_target_mode_changed(&self, value: HeatMode) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.engine.set_mode(value) {
            self.persist(&inner.engine).await?;
            info!("{} target mode changed to {}", self.name, value.as_str());
        }
        Ok(())
    }

    async fn on_current_temperature_changed(&self, value: f64) {
        info!("{} current temperature changed to {value}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU64;

    use heatbridge_common::{RelayState, MOCK_PIN};

    use crate::relay::MemoryRelay;
    use crate::sensor::{SensorError, SensorHandle};

    fn scratch_store(tag: &str) -> Arc<StateStore> {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let dir = std::env::temp_dir().join(format!(
            "heatbridge-room-{tag}-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        Arc::new(StateStore::new(dir))
    }

    fn room_config(temp_id: &str) -> RoomConfig {
        RoomConfig {
            relay_pin: MOCK_PIN,
            temp_pin: 4,
            temp_id: temp_id.to_string(),
            tick_seconds: 2,
        }
    }

    struct FakeBus {
        id: String,
        readings: Mutex<VecDeque<Result<f64, SensorError>>>,
    }

    impl FakeBus {
        fn new(id: &str, readings: Vec<Result<f64, SensorError>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                readings: Mutex::new(readings.into()),
            })
        }
    }

    #[async_trait]
    impl SensorBus for FakeBus {
        async fn list_sensors(&self) -> Result<Vec<SensorHandle>, SensorError> {
            Ok(vec![SensorHandle::synthetic(&self.id)])
        }

        async fn read_temperature(&self, _handle: &SensorHandle) -> Result<f64, SensorError> {
            self.readings
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(SensorError::Timeout))
        }
    }

    async fn controller_with(
        store: Arc<StateStore>,
        readings: Vec<Result<f64, SensorError>>,
        initial_relay: RelayState,
    ) -> (Arc<RoomController>, Arc<Telemetry>) {
        let telemetry = Telemetry::new();
        let bus = FakeBus::new("0316a279a6ff", readings);
        let controller = RoomController::assemble(
            "LivingRoom",
            &room_config("0316a279a6ff"),
            Box::new(MemoryRelay::new(initial_relay)),
            store,
            bus,
            telemetry.clone(),
        )
        .await
        .unwrap();
        (controller, telemetry)
    }

    #[tokio::test]
    async fn unknown_room_fails_construction() {
        let config: BridgeConfig = serde_json::from_str(r#"{"rooms": {}}"#).unwrap();
        let store = scratch_store("unknown");
        let bus = FakeBus::new("0316a279a6ff", Vec::new());

        let result =
            RoomController::new("Basement", &config, store, bus, Telemetry::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn construction_applies_config_over_stale_record_and_persists() {
        let store = scratch_store("merge");
        let stale = RoomRecord {
            relay_pin: 5,
            temp_pin: 6,
            temp_id: "deadbeef0000".to_string(),
            target_temp: 68.0,
            target_state: HeatMode::Heat,
        };
        store.save_room("LivingRoom", &stale).await.unwrap();

        let (_controller, _telemetry) = controller_with(store.clone(), Vec::new(), RelayState::Off).await;

        let merged = store.load_room("LivingRoom").await.unwrap().unwrap();
        // Hardware mapping refreshed from static config.
        assert_eq!(merged.relay_pin, MOCK_PIN);
        assert_eq!(merged.temp_pin, 4);
        assert_eq!(merged.temp_id, "0316a279a6ff");
        // User-set state survives the restart.
        assert_eq!(merged.target_temp, 68.0);
        assert_eq!(merged.target_state, HeatMode::Heat);
    }

    #[tokio::test]
    async fn first_run_persists_defaults() {
        let store = scratch_store("defaults");
        let (_controller, _telemetry) = controller_with(store.clone(), Vec::new(), RelayState::Off).await;

        let record = store.load_room("LivingRoom").await.unwrap().unwrap();
        assert_eq!(record.target_temp, 70.0);
        assert_eq!(record.target_state, HeatMode::Off);
    }

    #[tokio::test]
    async fn setters_persist_each_change() {
        let store = scratch_store("setters");
        let (controller, _telemetry) = controller_with(store.clone(), Vec::new(), RelayState::Off).await;

        controller.on_target_temperature_changed(21.5).await.unwrap();
        controller
            .on_target_mode_changed(HeatMode::Heat)
            .await
            .unwrap();

        let record = store.load_room("LivingRoom").await.unwrap().unwrap();
        assert_eq!(record.target_temp, 21.5);
        assert_eq!(record.target_state, HeatMode::Heat);

        controller.on_target_temperature_changed(20.0).await.unwrap();
        let record = store.load_room("LivingRoom").await.unwrap().unwrap();
        assert_eq!(record.target_temp, 20.0);
    }

    #[tokio::test]
    async fn heating_scenario_turns_relay_on_then_off() {
        let store = scratch_store("scenario");
        let (controller, telemetry) = controller_with(
            store,
            vec![Ok(20.0), Ok(22.0)],
            RelayState::Off,
        )
        .await;

        controller.on_target_temperature_changed(21.0).await.unwrap();
        controller
            .on_target_mode_changed(HeatMode::Heat)
            .await
            .unwrap();

        // One degree below target: turn on.
        controller.tick().await;
        let status = controller.status().await;
        assert!(status.heat_on);
        assert_eq!(status.status, Some("HEAT OFF - TURNING ON"));
        assert!(telemetry
            .render()
            .await
            .contains("heat_status{room=\"LivingRoom\"} 1"));

        // One degree above target: turn off.
        controller.tick().await;
        let status = controller.status().await;
        assert!(!status.heat_on);
        assert_eq!(status.status, Some("HEAT ON - TURNING OFF"));
        assert!(telemetry
            .render()
            .await
            .contains("heat_status{room=\"LivingRoom\"} 0"));
    }

    #[tokio::test]
    async fn off_mode_forces_relay_off() {
        let store = scratch_store("force-off");
        let (controller, _telemetry) =
            controller_with(store, vec![Ok(10.0)], RelayState::On).await;

        controller.tick().await;
        let status = controller.status().await;
        assert!(!status.heat_on);
        assert_eq!(status.status, Some("HEAT OFF - NOT REQUESTED"));
    }

    #[tokio::test]
    async fn sensor_failure_skips_tick_and_counts_error() {
        let store = scratch_store("sensor-failure");
        let (controller, telemetry) = controller_with(
            store,
            vec![Err(SensorError::NoMatch("0316a279a6ff".to_string()))],
            RelayState::On,
        )
        .await;

        controller
            .on_target_mode_changed(HeatMode::Heat)
            .await
            .unwrap();
        controller.tick().await;

        // Relay untouched, no current-temperature sample, one error counted.
        let status = controller.status().await;
        assert!(status.heat_on);
        assert_eq!(status.current_temp, None);
        assert_eq!(status.sensor_errors, 1);

        let rendered = telemetry.render().await;
        assert!(!rendered.contains("current_temperature{room=\"LivingRoom\""));
        assert!(rendered.contains("reset_error_count{room=\"LivingRoom\"} 1"));
    }

    #[tokio::test]
    async fn duplicate_status_still_updates_telemetry() {
        let store = scratch_store("dedup");
        let (controller, telemetry) = controller_with(
            store,
            vec![Ok(20.0), Ok(20.6), Ok(20.8)],
            RelayState::Off,
        )
        .await;

        controller.on_target_temperature_changed(21.0).await.unwrap();
        controller
            .on_target_mode_changed(HeatMode::Heat)
            .await
            .unwrap();

        controller.tick().await; // turning on
        controller.tick().await; // staying on
        controller.tick().await; // staying on again, status suppressed

        let status = controller.status().await;
        assert_eq!(status.status, Some("HEAT ON - STAYING ON"));

        // Gauge reflects the third reading even though the status line
        // was suppressed.
        let rendered = telemetry.render().await;
        assert!(rendered.contains(&format!(
            "current_temperature{{room=\"LivingRoom\",heat_status=\"1\"}} {}",
            display_temperature(20.8)
        )));
    }

    #[tokio::test]
    async fn stopped_controller_ignores_ticks() {
        let store = scratch_store("stopped");
        let (controller, telemetry) =
            controller_with(store, vec![Ok(10.0)], RelayState::Off).await;

        controller
            .on_target_mode_changed(HeatMode::Heat)
            .await
            .unwrap();
        controller.stop();
        controller.tick().await;

        // Cold room, but no tick ran: relay stays off, no samples.
        let status = controller.status().await;
        assert!(!status.heat_on);
        assert_eq!(status.current_temp, None);
        assert!(!telemetry
            .render()
            .await
            .contains("current_temperature{room=\"LivingRoom\""));
    }
}
