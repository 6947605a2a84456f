use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tracing::{info, warn};

use heatbridge_common::topics::{self, RoomCommand};
use heatbridge_common::{HeatMode, MqttConfig};

use crate::room::AccessoryCallbacks;
use crate::supervisor::Supervisor;

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Broker connection from static config; environment variables win so
/// deployments can move brokers without touching the config file.
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let host = std::env::var("MQTT_HOST").unwrap_or_else(|_| config.host.clone());
    let port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.port);

    let mut options = MqttOptions::new(config.client_id.clone(), host, port);
    let user = std::env::var("MQTT_USER").unwrap_or_else(|_| config.user.clone());
    let pass = std::env::var("MQTT_PASS").unwrap_or_else(|_| config.pass.clone());
    if !user.is_empty() {
        options.set_credentials(user, pass);
    }

    AsyncClient::new(options, 64)
}

pub async fn subscribe_commands(client: &AsyncClient) -> anyhow::Result<()> {
    client
        .subscribe(topics::CMD_SUBSCRIPTION, QoS::AtMostOnce)
        .await?;
    Ok(())
}

pub fn spawn_command_loop(supervisor: Arc<Supervisor>, mut eventloop: EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    handle_command(&supervisor, &message.topic, &message.payload).await;
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_command(supervisor: &Supervisor, topic: &str, payload: &[u8]) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized mqtt payload on topic {topic} ({} bytes)",
            payload.len()
        );
        return;
    }

    let Some((room, command)) = topics::parse_command(topic) else {
        return;
    };
    let Some(controller) = supervisor.controller(room) else {
        warn!("mqtt command for unknown room {room:?}");
        return;
    };
    let Ok(message) = std::str::from_utf8(payload) else {
        warn!("non utf8 mqtt payload on topic {topic}");
        return;
    };
    let message = message.trim();

    match command {
        RoomCommand::SetTarget => {
            let Ok(target) = message.parse::<f64>() else {
                warn!("unparsable target temperature {message:?} for {room}");
                return;
            };
            if let Err(err) = controller.on_target_temperature_changed(target).await {
                warn!("failed to apply mqtt target for {room}: {err:#}");
            }
        }
        RoomCommand::SetMode => {
            let Some(mode) = HeatMode::parse(message) else {
                warn!("unparsable mode {message:?} for {room}");
                return;
            };
            if let Err(err) = controller.on_target_mode_changed(mode).await {
                warn!("failed to apply mqtt mode for {room}: {err:#}");
            }
        }
    }
}

/// Publishes every room's retained status snapshot on a fixed period.
pub fn spawn_state_publish_loop(
    supervisor: Arc<Supervisor>,
    client: AsyncClient,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            for room in supervisor.rooms() {
                let status = room.status().await;
                match serde_json::to_vec(&status) {
                    Ok(body) => {
                        if let Err(err) = client
                            .publish(topics::state(room.name()), QoS::AtLeastOnce, true, body)
                            .await
                        {
                            warn!("state publish failed for {}: {err}", room.name());
                        }
                    }
                    Err(err) => warn!("state serialization failed for {}: {err}", room.name()),
                }
            }
        }
    });
}
