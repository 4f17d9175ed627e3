//! Chip-level control
//!
//! [`Chip`] owns the bus and all host-side socket state. Socket operations are provided
//! through the [`Sockets`](crate::socket::Sockets) trait.

use core::net::Ipv4Addr;

use crate::codec::Codec;
use crate::config::Config;
use crate::core::regs::{common, mode, phy, socket};
use crate::core::{
    ChipInterrupts, Command, MacAddress, NetInfo, NetMode, SOCKET_COUNT, SocketId, SocketSet,
    SocketStatus,
};
use crate::driver::Bus;
use crate::error::Error;
use crate::ring::{self, RingBuffer};
use crate::socket::SocketState;
use crate::time::{Duration, Instant};

/// Common mode register options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipMode(u8);

impl ChipMode {
    pub const NONE: Self = Self(0);
    pub const WAKE_ON_LAN: Self = Self(mode::WOL);
    pub const PING_BLOCK: Self = Self(mode::PB);
    pub const PPPOE: Self = Self(mode::PPPOE);
    pub const FORCE_ARP: Self = Self(mode::FARP);
    const MASK: u8 = mode::WOL | mode::PB | mode::PPPOE | mode::FARP;

    /// Fails with `Error::Argument` on bits that are not mode options.
    pub const fn from_bits(bits: u8) -> Result<Self, Error> {
        if bits & !Self::MASK != 0 {
            Err(Error::Argument)
        } else {
            Ok(Self(bits))
        }
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ChipMode {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Retransmission timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetTimeout {
    pub retry_count: u8,
    /// In 100 µs units
    pub retry_time: u16,
}

impl Default for NetTimeout {
    fn default() -> Self {
        Self {
            retry_count: 8,
            retry_time: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyConfigBy {
    /// Mode selected by the strap pins
    Hardware,
    /// Mode selected by [`PhyConfig`]
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyMode {
    AutoNegotiation,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Mbps10,
    Mbps100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Duplex {
    Half,
    Full,
}

/// PHY operation mode
///
/// `speed` and `duplex` apply to manual mode only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyConfig {
    pub by: PhyConfigBy,
    pub mode: PhyMode,
    pub speed: Speed,
    pub duplex: Duplex,
}

/// Negotiated link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyStatus {
    pub link_up: bool,
    pub speed: Speed,
    pub duplex: Duplex,
}

mod opmdc {
    pub const HALF_10: u8 = 0b000;
    pub const FULL_10: u8 = 0b001;
    pub const HALF_100: u8 = 0b010;
    pub const FULL_100: u8 = 0b011;
    pub const HALF_100_AUTO: u8 = 0b100;
    pub const ALL_AUTO: u8 = 0b111;
}

/// W5500 controller
pub struct Chip<B> {
    pub(crate) codec: Codec<B>,
    pub(crate) tx: [RingBuffer; SOCKET_COUNT],
    pub(crate) rx: [RingBuffer; SOCKET_COUNT],
    pub(crate) sockets: [SocketState; SOCKET_COUNT],
    pub(crate) any_port: u16,
    dns: Ipv4Addr,
    net_mode: NetMode,
    command_timeout: Duration,
}

impl<B: Bus> Chip<B> {
    /// Verifies the controller, resets it and applies `config`.
    pub fn new(bus: B, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let mut chip = Self {
            codec: Codec::new(bus),
            tx: ring::partition(&config.tx_buffers),
            rx: ring::partition(&config.rx_buffers),
            sockets: Default::default(),
            any_port: crate::socket::ANY_PORT_START,
            dns: config.net_info.dns,
            net_mode: config.net_info.mode,
            command_timeout: config.command_timeout,
        };

        let version = chip.version()?;
        if version != common::VERSION {
            error!("unexpected chip version {}", version);
            return Err(Error::Version(version));
        }

        chip.reset()?;
        chip.set_net_info(&config.net_info)?;
        chip.set_timeout(config.timeout)?;
        chip.set_mode(config.mode)?;
        if let Some(phy) = config.phy {
            chip.set_phy_config(phy)?;
        }
        for sn in SocketId::all() {
            chip.codec.set_socket_u8(sn, socket::IR, 0xff)?;
        }
        debug!("chip initialized");
        Ok(chip)
    }

    /// Returns the bus, leaving the controller as is.
    pub fn release(self) -> B {
        self.codec.release()
    }

    pub fn version(&mut self) -> Result<u8, Error> {
        Ok(self.codec.common_u8(common::VERSIONR)?)
    }

    /// Software reset
    ///
    /// Network identity registers and buffer sizes survive the reset. All sockets are closed.
    pub fn reset(&mut self) -> Result<(), Error> {
        let mac: [u8; 6] = self.codec.read_array(address(common::SHAR))?;
        let gateway: [u8; 4] = self.codec.read_array(address(common::GAR))?;
        let subnet: [u8; 4] = self.codec.read_array(address(common::SUBR))?;
        let ip: [u8; 4] = self.codec.read_array(address(common::SIPR))?;

        self.codec.set_common_u8(common::MR, mode::RST)?;
        // Reading back gives the reset time to complete
        self.codec.common_u8(common::MR)?;

        self.codec.write(address(common::SHAR), &mac)?;
        self.codec.write(address(common::GAR), &gateway)?;
        self.codec.write(address(common::SUBR), &subnet)?;
        self.codec.write(address(common::SIPR), &ip)?;

        for sn in SocketId::all() {
            let tx = (self.tx[sn.index()].capacity() >> 10) as u8;
            let rx = (self.rx[sn.index()].capacity() >> 10) as u8;
            self.codec.set_socket_u8(sn, socket::TXBUF_SIZE, tx)?;
            self.codec.set_socket_u8(sn, socket::RXBUF_SIZE, rx)?;
        }
        self.sockets = Default::default();
        Ok(())
    }

    /// Reads the network identity
    ///
    /// `dns` and `mode` are host-side values; the controller has no registers for them.
    pub fn net_info(&mut self) -> Result<NetInfo, Error> {
        let mac: [u8; 6] = self.codec.read_array(address(common::SHAR))?;
        let ip: [u8; 4] = self.codec.read_array(address(common::SIPR))?;
        let subnet: [u8; 4] = self.codec.read_array(address(common::SUBR))?;
        let gateway: [u8; 4] = self.codec.read_array(address(common::GAR))?;
        Ok(NetInfo {
            mac: MacAddress(mac),
            ip: Ipv4Addr::from(ip),
            subnet: Ipv4Addr::from(subnet),
            gateway: Ipv4Addr::from(gateway),
            dns: self.dns,
            mode: self.net_mode,
        })
    }

    /// Writes the complete network identity.
    pub fn set_net_info(&mut self, info: &NetInfo) -> Result<(), Error> {
        self.codec.write(address(common::SHAR), &info.mac.octets())?;
        self.codec.write(address(common::GAR), &info.gateway.octets())?;
        self.codec.write(address(common::SUBR), &info.subnet.octets())?;
        self.codec.write(address(common::SIPR), &info.ip.octets())?;
        self.dns = info.dns;
        self.net_mode = info.mode;
        Ok(())
    }

    pub fn mode(&mut self) -> Result<ChipMode, Error> {
        let mr = self.codec.common_u8(common::MR)?;
        Ok(ChipMode(mr & ChipMode::MASK))
    }

    pub fn set_mode(&mut self, chip_mode: ChipMode) -> Result<(), Error> {
        let mr = self.codec.common_u8(common::MR)?;
        let mr = (mr & !(ChipMode::MASK | mode::RST)) | chip_mode.into_bits();
        Ok(self.codec.set_common_u8(common::MR, mr)?)
    }

    pub fn timeout(&mut self) -> Result<NetTimeout, Error> {
        Ok(NetTimeout {
            retry_count: self.codec.common_u8(common::RCR)?,
            retry_time: self.codec.read_u16(address(common::RTR))?,
        })
    }

    pub fn set_timeout(&mut self, timeout: NetTimeout) -> Result<(), Error> {
        self.codec.set_common_u8(common::RCR, timeout.retry_count)?;
        Ok(self.codec.write_u16(address(common::RTR), timeout.retry_time)?)
    }

    pub fn interrupt(&mut self) -> Result<ChipInterrupts, Error> {
        let ir = self.codec.common_u8(common::IR)?;
        Ok(ChipInterrupts::from_bits_truncating(ir))
    }

    /// Acknowledges the given common interrupt sources only.
    pub fn clear_interrupt(&mut self, kinds: ChipInterrupts) -> Result<(), Error> {
        Ok(self.codec.set_common_u8(common::IR, kinds.into_bits())?)
    }

    /// Sockets with a pending, unmasked interrupt
    pub fn socket_interrupts(&mut self) -> Result<SocketSet, Error> {
        Ok(SocketSet::from_bits(self.codec.common_u8(common::SIR)?))
    }

    pub fn chip_interrupt_mask(&mut self) -> Result<(ChipInterrupts, SocketSet), Error> {
        let imr = self.codec.common_u8(common::IMR)?;
        let simr = self.codec.common_u8(common::SIMR)?;
        Ok((
            ChipInterrupts::from_bits_truncating(imr),
            SocketSet::from_bits(simr),
        ))
    }

    pub fn set_chip_interrupt_mask(
        &mut self,
        chip: ChipInterrupts,
        sockets: SocketSet,
    ) -> Result<(), Error> {
        self.codec.set_common_u8(common::IMR, chip.into_bits())?;
        Ok(self.codec.set_common_u8(common::SIMR, sockets.into_bits())?)
    }

    pub fn phy_link(&mut self) -> Result<bool, Error> {
        Ok(self.codec.common_u8(common::PHYCFGR)? & phy::LNK != 0)
    }

    pub fn phy_status(&mut self) -> Result<PhyStatus, Error> {
        let cfg = self.codec.common_u8(common::PHYCFGR)?;
        Ok(PhyStatus {
            link_up: cfg & phy::LNK != 0,
            speed: if cfg & phy::SPD != 0 {
                Speed::Mbps100
            } else {
                Speed::Mbps10
            },
            duplex: if cfg & phy::DPX != 0 {
                Duplex::Full
            } else {
                Duplex::Half
            },
        })
    }

    pub fn phy_config(&mut self) -> Result<PhyConfig, Error> {
        let cfg = self.codec.common_u8(common::PHYCFGR)?;
        let opmdc = (cfg & phy::OPMDC_MASK) >> phy::OPMDC_SHIFT;
        Ok(PhyConfig {
            by: if cfg & phy::OPMD != 0 {
                PhyConfigBy::Software
            } else {
                PhyConfigBy::Hardware
            },
            mode: match opmdc {
                opmdc::ALL_AUTO | opmdc::HALF_100_AUTO => PhyMode::AutoNegotiation,
                _ => PhyMode::Manual,
            },
            speed: match opmdc {
                opmdc::FULL_100 | opmdc::HALF_100 | opmdc::HALF_100_AUTO | opmdc::ALL_AUTO => {
                    Speed::Mbps100
                }
                _ => Speed::Mbps10,
            },
            duplex: match opmdc {
                opmdc::FULL_100 | opmdc::FULL_10 | opmdc::ALL_AUTO => Duplex::Full,
                _ => Duplex::Half,
            },
        })
    }

    /// Applies the operation mode and pulses the PHY reset.
    pub fn set_phy_config(&mut self, config: PhyConfig) -> Result<(), Error> {
        let opmd = match config.by {
            PhyConfigBy::Software => phy::OPMD,
            PhyConfigBy::Hardware => 0,
        };
        let opmdc = match (config.mode, config.speed, config.duplex) {
            (PhyMode::AutoNegotiation, _, _) => opmdc::ALL_AUTO,
            (PhyMode::Manual, Speed::Mbps100, Duplex::Full) => opmdc::FULL_100,
            (PhyMode::Manual, Speed::Mbps100, Duplex::Half) => opmdc::HALF_100,
            (PhyMode::Manual, Speed::Mbps10, Duplex::Full) => opmdc::FULL_10,
            (PhyMode::Manual, Speed::Mbps10, Duplex::Half) => opmdc::HALF_10,
        };
        let cfg = opmd | (opmdc << phy::OPMDC_SHIFT);
        // RST is active low
        self.codec.set_common_u8(common::PHYCFGR, cfg)?;
        Ok(self.codec.set_common_u8(common::PHYCFGR, cfg | phy::RST)?)
    }

    /// DNS server address kept for the application
    pub fn dns(&self) -> Ipv4Addr {
        self.dns
    }

    pub fn net_mode(&self) -> NetMode {
        self.net_mode
    }

    pub fn tx_buffer(&self, sn: SocketId) -> RingBuffer {
        self.tx[sn.index()]
    }

    pub fn rx_buffer(&self, sn: SocketId) -> RingBuffer {
        self.rx[sn.index()]
    }

    /// Issues `command` and waits for the controller to accept it.
    pub(crate) fn command(&mut self, sn: SocketId, command: Command) -> Result<(), Error> {
        self.codec
            .set_socket_u8(sn, socket::CR, command.into_u8())?;
        let deadline = Instant::now() + self.command_timeout;
        loop {
            if self.codec.socket_u8(sn, socket::CR)? == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("socket {}: command {:?} not accepted", sn.into_u8(), command);
                return Err(Error::Timeout);
            }
        }
    }

    /// Polls the status register until `done` holds or the command timeout elapses.
    pub(crate) fn settle(
        &mut self,
        sn: SocketId,
        done: impl Fn(SocketStatus) -> bool,
    ) -> Result<SocketStatus, Error> {
        let deadline = Instant::now() + self.command_timeout;
        loop {
            let status = self.socket_status(sn)?;
            if done(status) {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("socket {}: stuck in {:?}", sn.into_u8(), status);
                return Err(Error::Timeout);
            }
        }
    }

    pub(crate) fn socket_status(&mut self, sn: SocketId) -> Result<SocketStatus, Error> {
        Ok(SocketStatus::from_u8(self.codec.socket_u8(sn, socket::SR)?))
    }
}

fn address(offset: u16) -> crate::driver::frame::Address {
    crate::driver::frame::Address::common(offset)
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::driver::sim::Simulator;

    fn config() -> Config {
        let mut config = Config::default();
        config.net_info = NetInfo {
            mac: MacAddress([0x00, 0x08, 0xdc, 0x01, 0x02, 0x03]),
            ip: Ipv4Addr::new(192, 168, 1, 20),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            mode: NetMode::Static,
        };
        config
    }

    #[test]
    fn test_init_applies_config() {
        let sim = Simulator::new();
        let mut chip = Chip::new(sim.bus(), &config()).unwrap();
        assert_eq!(chip.net_info().unwrap(), config().net_info);
        assert_eq!(chip.timeout().unwrap(), NetTimeout::default());
        let state = sim.lock();
        assert_eq!(state.common_register(common::SIPR), 192);
        assert_eq!(
            state.socket_register(SocketId::MAX, socket::TXBUF_SIZE),
            2
        );
    }

    #[test]
    fn test_version_mismatch() {
        let sim = Simulator::new();
        sim.lock().set_common_register(common::VERSIONR, 0x51);
        let result = Chip::new(sim.bus(), &config());
        assert!(matches!(result, Err(Error::Version(0x51))));
    }

    #[test]
    fn test_net_info_round_trip() {
        let sim = Simulator::new();
        let mut chip = Chip::new(sim.bus(), &Config::default()).unwrap();
        let info = NetInfo {
            mac: MacAddress([0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc]),
            ip: Ipv4Addr::new(10, 1, 2, 3),
            subnet: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            dns: Ipv4Addr::new(1, 1, 1, 1),
            mode: NetMode::Dhcp,
        };
        chip.set_net_info(&info).unwrap();
        assert_eq!(chip.net_info().unwrap(), info);
        assert_eq!(chip.dns(), Ipv4Addr::new(1, 1, 1, 1));
    }

    #[test]
    fn test_reset_preserves_identity() {
        let sim = Simulator::new();
        let mut config = config();
        config.tx_buffers = [crate::core::BufferSize::Kb1; SOCKET_COUNT];
        config.tx_buffers[0] = crate::core::BufferSize::Kb8;
        let mut chip = Chip::new(sim.bus(), &config).unwrap();
        chip.reset().unwrap();
        assert_eq!(chip.net_info().unwrap(), config.net_info);
        assert_eq!(sim.lock().socket_register(SocketId::MIN, socket::TXBUF_SIZE), 8);
        assert_eq!(chip.tx_buffer(SocketId::MIN).capacity(), 8192);
    }

    #[test]
    fn test_mode_bits() {
        assert_eq!(ChipMode::from_bits(0x01), Err(Error::Argument));
        assert_eq!(ChipMode::from_bits(0x80), Err(Error::Argument));
        let sim = Simulator::new();
        let mut chip = Chip::new(sim.bus(), &Config::default()).unwrap();
        let wanted = ChipMode::PING_BLOCK | ChipMode::FORCE_ARP;
        chip.set_mode(wanted).unwrap();
        assert_eq!(chip.mode().unwrap(), wanted);
        chip.set_mode(ChipMode::WAKE_ON_LAN).unwrap();
        assert_eq!(chip.mode().unwrap(), ChipMode::WAKE_ON_LAN);
    }

    #[test]
    fn test_phy() {
        let sim = Simulator::new();
        let mut chip = Chip::new(sim.bus(), &Config::default()).unwrap();
        assert!(chip.phy_link().unwrap());
        assert_eq!(
            chip.phy_config().unwrap(),
            PhyConfig {
                by: PhyConfigBy::Hardware,
                mode: PhyMode::AutoNegotiation,
                speed: Speed::Mbps100,
                duplex: Duplex::Full,
            }
        );

        let manual = PhyConfig {
            by: PhyConfigBy::Software,
            mode: PhyMode::Manual,
            speed: Speed::Mbps10,
            duplex: Duplex::Full,
        };
        chip.set_phy_config(manual).unwrap();
        assert_eq!(chip.phy_config().unwrap(), manual);
        assert_eq!(sim.lock().common_register(common::PHYCFGR) & phy::RST, phy::RST);

        sim.lock().set_link(false);
        assert!(!chip.phy_status().unwrap().link_up);
    }

    #[test]
    fn test_interrupt_mask() {
        let sim = Simulator::new();
        let mut chip = Chip::new(sim.bus(), &Config::default()).unwrap();
        let sockets = SocketSet::from_bits(0b0000_0101);
        chip.set_chip_interrupt_mask(ChipInterrupts::IP_CONFLICT, sockets)
            .unwrap();
        assert_eq!(
            chip.chip_interrupt_mask().unwrap(),
            (ChipInterrupts::IP_CONFLICT, sockets)
        );

        sim.lock()
            .set_common_register(common::IR, ChipInterrupts::ALL.into_bits());
        chip.clear_interrupt(ChipInterrupts::IP_CONFLICT).unwrap();
        let pending = chip.interrupt().unwrap();
        assert!(!pending.contains(ChipInterrupts::IP_CONFLICT));
        assert!(pending.contains(ChipInterrupts::MAGIC_PACKET));
    }
}
