use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use heatbridge_common::BridgeConfig;

use crate::http::{self, ApiState};
use crate::mqtt;
use crate::room::RoomController;
use crate::sensor::{SensorBus, W1Bus};
use crate::store::StateStore;
use crate::supervisor::Supervisor;
use crate::telemetry::Telemetry;
use crate::weather::WeatherService;

const DEFAULT_CONFIG_PATH: &str = "./config/config.json";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("HEATBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("failed to load static configuration from {}", config_path.display()))?;

    let store = Arc::new(StateStore::new(&config.data_dir));
    let telemetry = Telemetry::new();
    let bus: Arc<dyn SensorBus> = Arc::new(W1Bus::new());

    // A room missing from static configuration aborts startup here; the
    // process never runs half-configured.
    let mut rooms = Vec::with_capacity(config.rooms.len());
    for name in config.rooms.keys() {
        let controller = RoomController::new(
            name,
            &config,
            store.clone(),
            bus.clone(),
            telemetry.clone(),
        )
        .await
        .with_context(|| format!("failed to start controller for room {name:?}"))?;
        rooms.push(controller);
    }

    let supervisor = Arc::new(Supervisor::new(rooms));
    supervisor.spawn().await;

    let (mqtt_client, eventloop) = mqtt::connect(&config.mqtt);
    if let Err(err) = mqtt::subscribe_commands(&mqtt_client).await {
        warn!("mqtt command subscription failed: {err:#}");
    }
    mqtt::spawn_command_loop(supervisor.clone(), eventloop);
    mqtt::spawn_state_publish_loop(
        supervisor.clone(),
        mqtt_client,
        Duration::from_secs(config.mqtt.state_publish_seconds),
    );

    let weather = Arc::new(WeatherService::new(config.weather_url.clone(), store.clone())?);

    let app = http::router(ApiState {
        supervisor: supervisor.clone(),
        telemetry,
        weather,
    });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port)
        .parse()
        .context("invalid http listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;
    info!("bridge stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c; the serve loop drains and the
/// supervisor stops every room controller afterwards.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to install ctrl-c handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
