use crate::types::{HeatMode, RelayState, TickStatus};

/// Hysteresis deadband in native units. Both switching thresholds use it;
/// shrinking it to zero makes the relay chatter on every tick.
pub const DEADBAND: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub relay: RelayState,
    pub status: TickStatus,
}

/// Per-room hysteresis engine. Holds the user-set target state and the
/// de-duplication memory for status output; the actuator's physical state
/// is always passed in fresh, never cached here.
#[derive(Debug, Clone)]
pub struct ControlEngine {
    target_temp: f64,
    mode: HeatMode,
    last_status: Option<TickStatus>,
}

impl ControlEngine {
    pub fn new(target_temp: f64, mode: HeatMode) -> Self {
        Self {
            target_temp,
            mode,
            last_status: None,
        }
    }

    pub fn target_temp(&self) -> f64 {
        self.target_temp
    }

    pub fn mode(&self) -> HeatMode {
        self.mode
    }

    pub fn last_status(&self) -> Option<TickStatus> {
        self.last_status
    }

    pub fn set_target_temp(&mut self, target: f64) -> bool {
        if (self.target_temp - target).abs() > f64::EPSILON {
            self.target_temp = target;
            true
        } else {
            false
        }
    }

    pub fn set_mode(&mut self, mode: HeatMode) -> bool {
        if self.mode != mode {
            self.mode = mode;
            true
        } else {
            false
        }
    }

    /// Decides the next relay state from the actuator's current physical
    /// state and a fresh sensor reading, both in native units.
    pub fn decide(&self, relay: RelayState, current: f64) -> Decision {
        if self.mode == HeatMode::Off {
            return Decision {
                relay: RelayState::Off,
                status: TickStatus::NotRequested,
            };
        }

        let delta = current - self.target_temp;
        match relay {
            RelayState::On => {
                if delta >= DEADBAND {
                    Decision {
                        relay: RelayState::Off,
                        status: TickStatus::TurningOff,
                    }
                } else {
                    Decision {
                        relay: RelayState::On,
                        status: TickStatus::StayingOn,
                    }
                }
            }
            RelayState::Off => {
                if delta <= -DEADBAND {
                    Decision {
                        relay: RelayState::On,
                        status: TickStatus::TurningOn,
                    }
                } else {
                    Decision {
                        relay: RelayState::Off,
                        status: TickStatus::StayingOff,
                    }
                }
            }
        }
    }

    /// Records this tick's status. Returns true when it differs from the
    /// previous tick's, i.e. when it should be emitted to the log.
    pub fn note_status(&mut self, status: TickStatus) -> bool {
        let changed = self.last_status != Some(status);
        self.last_status = Some(status);
        changed
    }
}
