use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use heatbridge_common::{RelayState, MOCK_PIN};

const GPIO_ROOT: &str = "/sys/class/gpio";

/// Binary actuator for one room's heating relay. `get_state` reads the
/// physical line back so the control loop always acts on ground truth,
/// with read-after-write consistency inside a tick.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn set_state(&self, state: RelayState) -> anyhow::Result<()>;
    async fn get_state(&self) -> anyhow::Result<RelayState>;
}

/// Builds the relay for a configured pin. The mock pin sentinel yields a
/// relay with all physical I/O disabled.
pub async fn build(pin: u64) -> anyhow::Result<Box<dyn Relay>> {
    if pin == MOCK_PIN {
        info!("relay pin {pin} is the mock sentinel, physical I/O disabled");
        return Ok(Box::new(NullRelay));
    }
    Ok(Box::new(SysfsRelay::open(pin).await?))
}

/// Kernel sysfs GPIO output: exported on open, driven through the pin's
/// `value` file, which also serves as the readback source.
pub struct SysfsRelay {
    value_path: PathBuf,
}

impl SysfsRelay {
    pub async fn open(pin: u64) -> anyhow::Result<Self> {
        Self::open_at(GPIO_ROOT, pin).await
    }

    async fn open_at(root: &str, pin: u64) -> anyhow::Result<Self> {
        let root = PathBuf::from(root);
        let pin_dir = root.join(format!("gpio{pin}"));

        if tokio::fs::metadata(&pin_dir).await.is_err() {
            tokio::fs::write(root.join("export"), pin.to_string())
                .await
                .with_context(|| format!("failed to export gpio pin {pin}"))?;
        }

        tokio::fs::write(pin_dir.join("direction"), "out")
            .await
            .with_context(|| format!("failed to set gpio pin {pin} direction"))?;

        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

#[async_trait]
impl Relay for SysfsRelay {
    async fn set_state(&self, state: RelayState) -> anyhow::Result<()> {
        tokio::fs::write(&self.value_path, state.bit().to_string())
            .await
            .with_context(|| format!("failed to write {}", self.value_path.display()))?;
        Ok(())
    }

    async fn get_state(&self) -> anyhow::Result<RelayState> {
        let raw = tokio::fs::read_to_string(&self.value_path)
            .await
            .with_context(|| format!("failed to read {}", self.value_path.display()))?;
        let bit: u8 = raw
            .trim()
            .parse()
            .with_context(|| format!("unexpected gpio value {raw:?}"))?;
        Ok(RelayState::from_bit(bit))
    }
}

/// Simulation-mode relay: writes are dropped, readback is always OFF.
pub struct NullRelay;

#[async_trait]
impl Relay for NullRelay {
    async fn set_state(&self, _state: RelayState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_state(&self) -> anyhow::Result<RelayState> {
        Ok(RelayState::Off)
    }
}

/// In-memory relay used by tests.
#[cfg(test)]
pub(crate) struct MemoryRelay {
    state: tokio::sync::Mutex<RelayState>,
}

#[cfg(test)]
impl MemoryRelay {
    pub(crate) fn new(initial: RelayState) -> Self {
        Self {
            state: tokio::sync::Mutex::new(initial),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Relay for MemoryRelay {
    async fn set_state(&self, state: RelayState) -> anyhow::Result<()> {
        *self.state.lock().await = state;
        Ok(())
    }

    async fn get_state(&self) -> anyhow::Result<RelayState> {
        Ok(*self.state.lock().await)
    }
}
