use crate::chip::{ChipMode, NetTimeout, PhyConfig};
use crate::core::{BufferSize, MEMORY_SIZE, NetInfo, SOCKET_COUNT};
use crate::error::ConfigError;
use crate::time::Duration;

/// Per-socket buffer sizes for one direction
pub type BufferTable = [BufferSize; SOCKET_COUNT];

/// Chip configuration applied by [`Chip::new`](crate::chip::Chip::new)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Network identity written after reset
    pub net_info: NetInfo,
    /// TX buffer size of each socket; the sum may not exceed 16 KB
    pub tx_buffers: BufferTable,
    /// RX buffer size of each socket; the sum may not exceed 16 KB
    pub rx_buffers: BufferTable,
    /// Retransmission timing
    pub timeout: NetTimeout,
    /// Upper bound for a command to be accepted and for the status to settle after
    /// `OPEN` and `CLOSE`
    pub command_timeout: Duration,
    /// PHY operation mode; `None` keeps the hardware-strapped mode
    pub phy: Option<PhyConfig>,
    pub mode: ChipMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            net_info: NetInfo::default(),
            tx_buffers: [BufferSize::Kb2; SOCKET_COUNT],
            rx_buffers: [BufferSize::Kb2; SOCKET_COUNT],
            timeout: NetTimeout::default(),
            command_timeout: Duration::from_millis(10),
            phy: None,
            mode: ChipMode::NONE,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if total_size(&self.tx_buffers) > MEMORY_SIZE {
            return Err(ConfigError::TxMemory);
        }
        if total_size(&self.rx_buffers) > MEMORY_SIZE {
            return Err(ConfigError::RxMemory);
        }
        Ok(())
    }
}

pub(crate) fn total_size(table: &BufferTable) -> usize {
    table.iter().map(|&size| usize::from(size)).sum()
}
