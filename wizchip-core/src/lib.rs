//! WIZnet W5500 core data types
//!
//! This crate provides basic data type definitions used by other wizchip crates.
//! Driver users should not depend on this crate directly. Use `wizchip::core` reexport instead.
#![no_std]

mod net;
pub mod regs;

pub use net::{MacAddress, NetInfo, NetMode};

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Number of independent hardware sockets
pub const SOCKET_COUNT: usize = 8;

/// Size of each of the controller's TX and RX buffer memories
pub const MEMORY_SIZE: usize = 16 * 1024;

macro_rules! impl_bit_ops {
    ($set:ident) => {
        impl core::ops::Not for $set {
            type Output = Self;
            fn not(self) -> Self::Output {
                Self(!self.0)
            }
        }

        impl core::ops::BitAnd<$set> for $set {
            type Output = Self;
            fn bitand(self, rhs: $set) -> Self::Output {
                $set(self.0 & rhs.0)
            }
        }

        impl core::ops::BitAndAssign<$set> for $set {
            fn bitand_assign(&mut self, rhs: $set) {
                self.0 &= rhs.0
            }
        }

        impl core::ops::BitOr<$set> for $set {
            type Output = Self;
            fn bitor(self, rhs: $set) -> Self::Output {
                $set(self.0 | rhs.0)
            }
        }

        impl core::ops::BitOrAssign<$set> for $set {
            fn bitor_assign(&mut self, rhs: $set) {
                self.0 |= rhs.0;
            }
        }
    };
}

/// Hardware socket (channel) number
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketId(u8);

impl SocketId {
    const MAX_VALUE: u8 = SOCKET_COUNT as u8 - 1;
    pub const MIN: SocketId = SocketId(0);
    pub const MAX: SocketId = SocketId(Self::MAX_VALUE);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over all sockets in ascending order.
    pub fn all() -> impl Iterator<Item = SocketId> {
        (0..=Self::MAX_VALUE).map(SocketId)
    }
}

impl From<SocketId> for u8 {
    fn from(value: SocketId) -> Self {
        value.into_u8()
    }
}

impl From<SocketId> for usize {
    fn from(value: SocketId) -> Self {
        value.index()
    }
}

impl TryFrom<u8> for SocketId {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// A set of sockets
///
/// Bit `n` stands for socket `n`, matching the layout of the socket interrupt register
/// and its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketSet(u8);

impl SocketSet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u8::MAX);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn new_eq(socket: SocketId) -> Self {
        Self(1u8 << socket.into_u8())
    }

    pub const fn contains(&self, socket: SocketId) -> bool {
        (self.0 >> socket.into_u8()) & 0x1 != 0
    }

    pub const fn insert(&mut self, socket: SocketId) {
        self.0 |= Self::new_eq(socket).0
    }

    pub const fn remove(&mut self, socket: SocketId) {
        self.0 &= !Self::new_eq(socket).0
    }

    pub const fn first(&self) -> Option<SocketId> {
        SocketId::new(self.0.trailing_zeros() as u8)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl_bit_ops!(SocketSet);

impl core::iter::IntoIterator for SocketSet {
    type Item = SocketId;
    type IntoIter = SocketSetIterator;
    fn into_iter(self) -> Self::IntoIter {
        SocketSetIterator { residual: self }
    }
}

pub struct SocketSetIterator {
    residual: SocketSet,
}

impl core::iter::Iterator for SocketSetIterator {
    type Item = SocketId;
    fn next(&mut self) -> Option<Self::Item> {
        let first = self.residual.first();
        if let Some(socket) = first {
            self.residual.remove(socket);
        }
        first
    }
}

/// Socket protocol as encoded in the lower nibble of the socket mode register
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Protocol {
    Tcp = 0x01,
    Udp = 0x02,
    /// Link-layer frames; source framing is embedded in the payload
    MacRaw = 0x04,
}

impl Protocol {
    /// Decodes the socket mode register. Returns `None` for a closed socket or unsupported mode.
    pub const fn from_mode(mode: u8) -> Option<Self> {
        match mode & 0x0f {
            0x01 => Some(Protocol::Tcp),
            0x02 => Some(Protocol::Udp),
            0x04 => Some(Protocol::MacRaw),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> Self {
        value.into_u8()
    }
}

/// Socket status register value
///
/// TCP transitions past `Established` are driven by the controller and only mirrored here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketStatus {
    Closed,
    Init,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Udp,
    MacRaw,
    /// Transient status codes not covered above
    Unknown(u8),
}

impl SocketStatus {
    pub const fn from_u8(code: u8) -> Self {
        match code {
            0x00 => SocketStatus::Closed,
            0x13 => SocketStatus::Init,
            0x14 => SocketStatus::Listen,
            0x15 => SocketStatus::SynSent,
            0x16 => SocketStatus::SynRecv,
            0x17 => SocketStatus::Established,
            0x18 => SocketStatus::FinWait,
            0x1a => SocketStatus::Closing,
            0x1b => SocketStatus::TimeWait,
            0x1c => SocketStatus::CloseWait,
            0x1d => SocketStatus::LastAck,
            0x22 => SocketStatus::Udp,
            0x42 => SocketStatus::MacRaw,
            other => SocketStatus::Unknown(other),
        }
    }

    pub const fn into_u8(self) -> u8 {
        match self {
            SocketStatus::Closed => 0x00,
            SocketStatus::Init => 0x13,
            SocketStatus::Listen => 0x14,
            SocketStatus::SynSent => 0x15,
            SocketStatus::SynRecv => 0x16,
            SocketStatus::Established => 0x17,
            SocketStatus::FinWait => 0x18,
            SocketStatus::Closing => 0x1a,
            SocketStatus::TimeWait => 0x1b,
            SocketStatus::CloseWait => 0x1c,
            SocketStatus::LastAck => 0x1d,
            SocketStatus::Udp => 0x22,
            SocketStatus::MacRaw => 0x42,
            SocketStatus::Unknown(code) => code,
        }
    }

    /// Statuses allowing TCP data transfer
    pub const fn is_connected(self) -> bool {
        matches!(self, SocketStatus::Established | SocketStatus::CloseWait)
    }
}

impl From<u8> for SocketStatus {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl From<SocketStatus> for u8 {
    fn from(value: SocketStatus) -> Self {
        value.into_u8()
    }
}

/// Socket command register value
///
/// The register self-clears to zero once the controller accepts the command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Open = 0x01,
    Listen = 0x02,
    Connect = 0x04,
    Disconnect = 0x08,
    Close = 0x10,
    Send = 0x20,
    SendMac = 0x21,
    SendKeep = 0x22,
    Recv = 0x40,
}

impl Command {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Per-socket interrupt source
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SocketInterrupt {
    Connected = 0,
    Disconnected = 1,
    Received = 2,
    Timeout = 3,
    SendOk = 4,
}

impl SocketInterrupt {
    pub const fn try_from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(SocketInterrupt::Connected),
            1 => Some(SocketInterrupt::Disconnected),
            2 => Some(SocketInterrupt::Received),
            3 => Some(SocketInterrupt::Timeout),
            4 => Some(SocketInterrupt::SendOk),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

/// A set of socket interrupt sources, laid out as the socket interrupt register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptSet(u8);

impl InterruptSet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0x1f);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Keeps the defined interrupt bits only.
    pub const fn from_bits_truncating(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn new_eq(kind: SocketInterrupt) -> Self {
        Self(1u8 << kind.into_u8())
    }

    pub const fn contains(&self, kind: SocketInterrupt) -> bool {
        (self.0 >> kind.into_u8()) & 0x1 != 0
    }

    pub const fn insert(&mut self, kind: SocketInterrupt) {
        self.0 |= Self::new_eq(kind).0
    }

    pub const fn remove(&mut self, kind: SocketInterrupt) {
        self.0 &= !Self::new_eq(kind).0
    }

    pub const fn first(&self) -> Option<SocketInterrupt> {
        SocketInterrupt::try_from_u8(self.0.trailing_zeros() as u8)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl_bit_ops!(InterruptSet);

impl From<SocketInterrupt> for InterruptSet {
    fn from(value: SocketInterrupt) -> Self {
        Self::new_eq(value)
    }
}

impl core::iter::IntoIterator for InterruptSet {
    type Item = SocketInterrupt;
    type IntoIter = InterruptSetIterator;
    fn into_iter(self) -> Self::IntoIter {
        InterruptSetIterator { residual: self }
    }
}

pub struct InterruptSetIterator {
    residual: InterruptSet,
}

impl core::iter::Iterator for InterruptSetIterator {
    type Item = SocketInterrupt;
    fn next(&mut self) -> Option<Self::Item> {
        let first = self.residual.first();
        if let Some(kind) = first {
            self.residual.remove(kind);
        }
        first
    }
}

/// Common (chip-level) interrupt sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInterrupts(u8);

impl ChipInterrupts {
    pub const NONE: Self = Self(0);
    /// Wake-on-LAN magic packet received
    pub const MAGIC_PACKET: Self = Self(1 << 4);
    pub const PPPOE_TERMINATED: Self = Self(1 << 5);
    pub const DESTINATION_UNREACHABLE: Self = Self(1 << 6);
    pub const IP_CONFLICT: Self = Self(1 << 7);
    pub const ALL: Self = Self(0xf0);

    pub const fn from_bits_truncating(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl_bit_ops!(ChipInterrupts);

/// Socket open flags
///
/// The upper nibble is written to the socket mode register. Bit 0 selects non-blocking IO and
/// is kept by the driver only. Several flags share bits and are meaningful for one protocol only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketFlags(u8);

impl SocketFlags {
    pub const NONE: Self = Self(0);
    /// Non-blocking IO mode (driver only)
    pub const IO_NONBLOCK: Self = Self(0x01);
    /// UDP: enable multicast
    pub const MULTI_ENABLE: Self = Self(0x80);
    /// MACRAW: receive broadcast, multicast and own packets only
    pub const ETHER_OWN: Self = Self(0x80);
    /// UDP, MACRAW: block broadcast packets
    pub const BROAD_BLOCK: Self = Self(0x40);
    /// TCP: no delayed ACK
    pub const TCP_NODELAY: Self = Self(0x20);
    /// UDP with multicast: use IGMP version 2
    pub const IGMP_VER2: Self = Self(0x20);
    /// MACRAW: block multicast packets
    pub const MULTI_BLOCK: Self = Self(0x20);
    /// UDP with multicast: block unicast packets
    pub const UNI_BLOCK: Self = Self(0x10);
    /// MACRAW: block IPv6 packets
    pub const IPV6_BLOCK: Self = Self(0x10);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Bits written to the socket mode register
    pub const fn mode_bits(&self) -> u8 {
        self.0 & 0xf0
    }
}

impl_bit_ops!(SocketFlags);

/// Socket buffer size accepted by the controller
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BufferSize {
    Kb1 = 1,
    Kb2 = 2,
    Kb4 = 4,
    Kb8 = 8,
    Kb16 = 16,
}

impl BufferSize {
    pub const fn try_from_kb(kb: u8) -> Option<Self> {
        match kb {
            1 => Some(BufferSize::Kb1),
            2 => Some(BufferSize::Kb2),
            4 => Some(BufferSize::Kb4),
            8 => Some(BufferSize::Kb8),
            16 => Some(BufferSize::Kb16),
            _ => None,
        }
    }

    pub const fn kilobytes(self) -> u8 {
        self as u8
    }

    pub const fn bytes(self) -> u16 {
        (self as u16) << 10
    }
}

impl TryFrom<u8> for BufferSize {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_kb(value).ok_or(InvalidValue)
    }
}

impl From<BufferSize> for usize {
    fn from(value: BufferSize) -> Self {
        usize::from(value.bytes())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    #[test]
    fn test_socket_id_range() {
        for value in 0u8..=255 {
            assert_eq!(SocketId::new(value).is_some(), value < 8);
        }
        assert_eq!(SocketId::from_u8_truncating(9), SocketId::new(1).unwrap());
        assert_eq!(SocketId::all().count(), SOCKET_COUNT);
    }

    #[test]
    fn test_socket_set_iteration() {
        let set = SocketSet::from_bits(0b1010_0101);
        let ids: Vec<u8> = set.into_iter().map(u8::from).collect();
        assert_eq!(ids, [0, 2, 5, 7]);
        assert!(SocketSet::NONE.into_iter().next().is_none());
    }

    #[test]
    fn test_interrupt_set() {
        let mut set = InterruptSet::from_bits_truncating(0xff);
        assert_eq!(set, InterruptSet::ALL);
        set.remove(SocketInterrupt::Received);
        assert!(!set.contains(SocketInterrupt::Received));
        assert!(set.contains(SocketInterrupt::SendOk));
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            [
                SocketInterrupt::Connected,
                SocketInterrupt::Disconnected,
                SocketInterrupt::Timeout,
                SocketInterrupt::SendOk,
            ]
        );
    }

    #[test]
    fn test_status_codes() {
        for code in 0u8..=255 {
            assert_eq!(SocketStatus::from_u8(code).into_u8(), code);
        }
        assert_eq!(SocketStatus::from_u8(0x11), SocketStatus::Unknown(0x11));
        assert!(SocketStatus::CloseWait.is_connected());
        assert!(!SocketStatus::Listen.is_connected());
    }

    #[test]
    fn test_buffer_size() {
        let valid: Vec<u8> = (0u8..=32)
            .filter(|kb| BufferSize::try_from_kb(*kb).is_some())
            .collect();
        assert_eq!(valid, [1, 2, 4, 8, 16]);
        assert_eq!(BufferSize::Kb2.bytes(), 2048);
        assert_eq!(BufferSize::Kb16.bytes(), 16384);
    }
}
