//! MQTT topic layout: `heatbridge/cmnd/<room>/<command>` inbound,
//! `heatbridge/state/<room>` outbound.

pub const CMD_SUBSCRIPTION: &str = "heatbridge/cmnd/+/+";

const CMD_PREFIX: &str = "heatbridge/cmnd/";
const STATE_PREFIX: &str = "heatbridge/state/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCommand {
    SetTarget,
    SetMode,
}

pub fn cmd_target(room: &str) -> String {
    format!("{CMD_PREFIX}{room}/target")
}

pub fn cmd_mode(room: &str) -> String {
    format!("{CMD_PREFIX}{room}/mode")
}

pub fn state(room: &str) -> String {
    format!("{STATE_PREFIX}{room}")
}

/// Splits an inbound command topic into its room and command parts.
/// Topics outside the command prefix yield `None`.
pub fn parse_command(topic: &str) -> Option<(&str, RoomCommand)> {
    let rest = topic.strip_prefix(CMD_PREFIX)?;
    let (room, command) = rest.split_once('/')?;
    if room.is_empty() {
        return None;
    }

    match command {
        "target" => Some((room, RoomCommand::SetTarget)),
        "mode" => Some((room, RoomCommand::SetMode)),
        _ => None,
    }
}
