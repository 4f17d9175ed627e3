//! In-memory controller model
//!
//! [`Simulator`] models the register file, buffer memories and command processing of a
//! W5500 closely enough to drive the stack without hardware. The model is strict where the
//! real chip is lenient: buffer transfers must stay within the socket's configured region,
//! so a missed wraparound split surfaces as a [`BusError`].
//!
//! TCP handshakes are collapsed: the remote peer is scripted through [`State`] methods such
//! as [`State::peer_connect`] and [`State::peer_send`].

extern crate std;

use core::net::Ipv4Addr;
use std::boxed::Box;
use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use wizchip_core::regs::{common, mode, phy, socket};
use wizchip_core::{
    Command, InterruptSet, MEMORY_SIZE, SOCKET_COUNT, SocketId, SocketInterrupt, SocketStatus,
};

use crate::frame::{Block, Direction, Header};
use crate::{Bus, BusError};

const COMMON_LEN: usize = 0x40;
const SOCKET_LEN: usize = 0x30;

/// Remote side response to a `CONNECT` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    #[default]
    Accept,
    /// The retransmission timer expires after the given number of status polls
    TimeoutAfter(u32),
    /// The handshake never completes
    Hold,
}

/// Logged bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub header: Header,
    pub len: usize,
}

/// Callback invoked at the start of every bus transaction
pub type Hook = Box<dyn FnMut(&mut State) + Send>;

struct SocketModel {
    regs: [u8; SOCKET_LEN],
    tx: Vec<u8>,
    rx: Vec<u8>,
    sent: Vec<Vec<u8>>,
    commands: Vec<u8>,
    keep_alive_sent: usize,
    pending_timeout: Option<u32>,
    connect: ConnectBehavior,
}

impl SocketModel {
    fn new() -> Self {
        let mut model = Self {
            regs: [0; SOCKET_LEN],
            tx: std::vec![0; MEMORY_SIZE],
            rx: std::vec![0; MEMORY_SIZE],
            sent: Vec::new(),
            commands: Vec::new(),
            keep_alive_sent: 0,
            pending_timeout: None,
            connect: ConnectBehavior::Accept,
        };
        model.reset();
        model
    }

    fn reset(&mut self) {
        self.regs = [0; SOCKET_LEN];
        self.regs[usize::from(socket::IMR)] = 0xff;
        self.regs[usize::from(socket::TTL)] = 0x80;
        self.regs[usize::from(socket::RXBUF_SIZE)] = 2;
        self.regs[usize::from(socket::TXBUF_SIZE)] = 2;
        self.set_u16(socket::MSSR, 0xffff);
        self.set_u16(socket::FRAG, 0x4000);
        self.pending_timeout = None;
    }

    fn u16(&self, offset: u16) -> u16 {
        let offset = usize::from(offset);
        u16::from_be_bytes([self.regs[offset], self.regs[offset + 1]])
    }

    fn set_u16(&mut self, offset: u16, value: u16) {
        let offset = usize::from(offset);
        self.regs[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn status(&self) -> SocketStatus {
        SocketStatus::from_u8(self.regs[usize::from(socket::SR)])
    }

    fn set_status(&mut self, status: SocketStatus) {
        self.regs[usize::from(socket::SR)] = status.into_u8();
    }

    fn raise(&mut self, kind: SocketInterrupt) {
        self.regs[usize::from(socket::IR)] |= InterruptSet::new_eq(kind).into_bits();
    }

    fn tx_capacity(&self) -> usize {
        usize::from(self.regs[usize::from(socket::TXBUF_SIZE)]) << 10
    }

    fn rx_capacity(&self) -> usize {
        usize::from(self.regs[usize::from(socket::RXBUF_SIZE)]) << 10
    }

    fn tx_free(&self) -> u16 {
        let used = self.u16(socket::TX_WR).wrapping_sub(self.u16(socket::TX_RD));
        (self.tx_capacity() as u16).wrapping_sub(used)
    }

    fn rx_received(&self) -> u16 {
        self.u16(socket::RX_WR).wrapping_sub(self.u16(socket::RX_RD))
    }

    fn read_byte(&mut self, offset: u16) -> u8 {
        match offset {
            socket::SR => {
                if let Some(polls) = self.pending_timeout {
                    if polls == 0 {
                        self.pending_timeout = None;
                        self.raise(SocketInterrupt::Timeout);
                        self.set_status(SocketStatus::Closed);
                    } else {
                        self.pending_timeout = Some(polls - 1);
                    }
                }
                self.regs[usize::from(offset)]
            }
            o if o == socket::TX_FSR => self.tx_free().to_be_bytes()[0],
            o if o == socket::TX_FSR + 1 => self.tx_free().to_be_bytes()[1],
            o if o == socket::RX_RSR => self.rx_received().to_be_bytes()[0],
            o if o == socket::RX_RSR + 1 => self.rx_received().to_be_bytes()[1],
            o if usize::from(o) < SOCKET_LEN => self.regs[usize::from(o)],
            _ => 0,
        }
    }

    fn write_byte(&mut self, offset: u16, value: u8, stalled: bool, auto_send_ok: bool) {
        let read_only = [
            socket::SR,
            socket::TX_FSR,
            socket::TX_FSR + 1,
            socket::TX_RD,
            socket::TX_RD + 1,
            socket::RX_RSR,
            socket::RX_RSR + 1,
            socket::RX_WR,
            socket::RX_WR + 1,
        ];
        match offset {
            socket::CR => {
                self.commands.push(value);
                if stalled {
                    self.regs[usize::from(socket::CR)] = value;
                } else {
                    self.execute(value, auto_send_ok);
                }
            }
            socket::IR => self.regs[usize::from(socket::IR)] &= !value,
            o if read_only.contains(&o) => {}
            o if usize::from(o) < SOCKET_LEN => self.regs[usize::from(o)] = value,
            _ => {}
        }
    }

    fn execute(&mut self, command: u8, auto_send_ok: bool) {
        self.regs[usize::from(socket::CR)] = 0;
        let status = self.status();
        match command {
            c if c == Command::Open.into_u8() => {
                let next = match self.regs[usize::from(socket::MR)] & 0x0f {
                    0x01 => SocketStatus::Init,
                    0x02 => SocketStatus::Udp,
                    0x04 => SocketStatus::MacRaw,
                    _ => SocketStatus::Closed,
                };
                for offset in [socket::TX_RD, socket::TX_WR, socket::RX_RD, socket::RX_WR] {
                    self.set_u16(offset, 0);
                }
                self.set_status(next);
            }
            c if c == Command::Listen.into_u8() => {
                if status == SocketStatus::Init {
                    self.set_status(SocketStatus::Listen);
                }
            }
            c if c == Command::Connect.into_u8() => {
                if status == SocketStatus::Init {
                    match self.connect {
                        ConnectBehavior::Accept => {
                            self.set_status(SocketStatus::Established);
                            self.raise(SocketInterrupt::Connected);
                        }
                        ConnectBehavior::TimeoutAfter(polls) => {
                            self.set_status(SocketStatus::SynSent);
                            self.pending_timeout = Some(polls);
                        }
                        ConnectBehavior::Hold => self.set_status(SocketStatus::SynSent),
                    }
                }
            }
            c if c == Command::Disconnect.into_u8() => {
                if status.is_connected() {
                    self.raise(SocketInterrupt::Disconnected);
                }
                self.set_status(SocketStatus::Closed);
            }
            c if c == Command::Close.into_u8() => {
                self.pending_timeout = None;
                self.set_status(SocketStatus::Closed);
            }
            c if c == Command::Send.into_u8() || c == Command::SendMac.into_u8() => {
                let start = self.u16(socket::TX_RD);
                let end = self.u16(socket::TX_WR);
                let len = usize::from(end.wrapping_sub(start));
                let capacity = self.tx_capacity();
                let payload = (0..len)
                    .map(|i| self.tx[(usize::from(start) + i) % capacity])
                    .collect();
                self.sent.push(payload);
                self.set_u16(socket::TX_RD, end);
                if auto_send_ok {
                    self.raise(SocketInterrupt::SendOk);
                }
            }
            c if c == Command::SendKeep.into_u8() => self.keep_alive_sent += 1,
            _ => {}
        }
    }

    fn push_rx(&mut self, bytes: &[u8]) {
        let capacity = self.rx_capacity();
        let wr = self.u16(socket::RX_WR);
        for (i, byte) in bytes.iter().enumerate() {
            self.rx[(usize::from(wr) + i) % capacity] = *byte;
        }
        self.set_u16(socket::RX_WR, wr.wrapping_add(bytes.len() as u16));
        self.raise(SocketInterrupt::Received);
    }
}

/// Complete model state
pub struct State {
    common: [u8; COMMON_LEN],
    sockets: [SocketModel; SOCKET_COUNT],
    link_status: u8,
    stalled: bool,
    auto_send_ok: bool,
    fault: bool,
    log: Vec<Transaction>,
    hook: Option<Hook>,
}

impl State {
    fn new() -> Self {
        let mut state = Self {
            common: [0; COMMON_LEN],
            sockets: core::array::from_fn(|_| SocketModel::new()),
            link_status: phy::LNK | phy::SPD | phy::DPX,
            stalled: false,
            auto_send_ok: true,
            fault: false,
            log: Vec::new(),
            hook: None,
        };
        state.reset_common();
        state
    }

    fn reset_common(&mut self) {
        self.common = [0; COMMON_LEN];
        self.common[usize::from(common::RTR)..usize::from(common::RTR) + 2]
            .copy_from_slice(&2000u16.to_be_bytes());
        self.common[usize::from(common::RCR)] = 8;
        self.common[usize::from(common::PTIMER)] = 0x28;
        self.common[usize::from(common::PMRU)..usize::from(common::PMRU) + 2]
            .copy_from_slice(&0xffffu16.to_be_bytes());
        self.common[usize::from(common::PHYCFGR)] = phy::RST | phy::OPMDC_MASK;
        self.common[usize::from(common::VERSIONR)] = common::VERSION;
        for model in self.sockets.iter_mut() {
            model.reset();
        }
    }

    fn socket_interrupts(&self) -> u8 {
        self.sockets
            .iter()
            .enumerate()
            .filter(|(_, model)| {
                model.regs[usize::from(socket::IR)] & model.regs[usize::from(socket::IMR)] != 0
            })
            .fold(0, |acc, (index, _)| acc | (1 << index))
    }

    fn read_common(&self, offset: u16) -> u8 {
        match offset {
            common::SIR => self.socket_interrupts(),
            common::PHYCFGR => {
                (self.common[usize::from(common::PHYCFGR)] & 0xf8) | (self.link_status & 0x07)
            }
            o if usize::from(o) < COMMON_LEN => self.common[usize::from(o)],
            _ => 0,
        }
    }

    fn write_common(&mut self, offset: u16, value: u8) {
        match offset {
            common::MR if value & mode::RST != 0 => self.reset_common(),
            common::IR => self.common[usize::from(common::IR)] &= !value,
            common::SIR | common::VERSIONR => {}
            o if usize::from(o) < COMMON_LEN => self.common[usize::from(o)] = value,
            _ => {}
        }
    }

    fn transact(
        &mut self,
        header: &[u8; Header::LENGTH],
        direction: Direction,
        len: usize,
        mut data: Access<'_>,
    ) -> Result<(), BusError> {
        if let Some(mut hook) = self.hook.take() {
            hook(self);
            if self.hook.is_none() {
                self.hook = Some(hook);
            }
        }
        if core::mem::take(&mut self.fault) {
            return Err(BusError::Transfer);
        }
        let header = Header::decode(header).map_err(|_| BusError::Transfer)?;
        if header.direction != direction {
            return Err(BusError::Transfer);
        }
        self.log.push(Transaction { header, len });

        let offset = header.address.offset;
        match header.address.block {
            Block::Common => {
                for i in 0..len {
                    let addr = offset.wrapping_add(i as u16);
                    match &mut data {
                        Access::Read(buf) => buf[i] = self.read_common(addr),
                        Access::Write(buf) => self.write_common(addr, buf[i]),
                    }
                }
            }
            Block::Socket(sn) => {
                let (stalled, auto_send_ok) = (self.stalled, self.auto_send_ok);
                let model = &mut self.sockets[sn.index()];
                for i in 0..len {
                    let addr = offset.wrapping_add(i as u16);
                    match &mut data {
                        Access::Read(buf) => buf[i] = model.read_byte(addr),
                        Access::Write(buf) => model.write_byte(addr, buf[i], stalled, auto_send_ok),
                    }
                }
            }
            Block::Tx(sn) | Block::Rx(sn) => {
                let model = &mut self.sockets[sn.index()];
                let (memory, capacity) = match header.address.block {
                    Block::Tx(_) => {
                        let capacity = model.tx_capacity();
                        (&mut model.tx, capacity)
                    }
                    _ => {
                        let capacity = model.rx_capacity();
                        (&mut model.rx, capacity)
                    }
                };
                let start = usize::from(offset);
                if start + len > capacity {
                    return Err(BusError::Transfer);
                }
                match data {
                    Access::Read(buf) => buf.copy_from_slice(&memory[start..start + len]),
                    Access::Write(buf) => memory[start..start + len].copy_from_slice(buf),
                }
            }
        }
        Ok(())
    }

    pub fn status(&self, sn: SocketId) -> SocketStatus {
        self.sockets[sn.index()].status()
    }

    pub fn set_status(&mut self, sn: SocketId, status: SocketStatus) {
        self.sockets[sn.index()].set_status(status);
    }

    /// Raw socket interrupt register
    pub fn interrupts(&self, sn: SocketId) -> InterruptSet {
        InterruptSet::from_bits(self.sockets[sn.index()].regs[usize::from(socket::IR)])
    }

    pub fn raise(&mut self, sn: SocketId, kind: SocketInterrupt) {
        self.sockets[sn.index()].raise(kind);
    }

    pub fn common_register(&self, offset: u16) -> u8 {
        self.read_common(offset)
    }

    pub fn set_common_register(&mut self, offset: u16, value: u8) {
        self.common[usize::from(offset)] = value;
    }

    pub fn socket_register(&self, sn: SocketId, offset: u16) -> u8 {
        self.sockets[sn.index()].regs[usize::from(offset)]
    }

    pub fn socket_register_u16(&self, sn: SocketId, offset: u16) -> u16 {
        match offset {
            socket::TX_FSR => self.sockets[sn.index()].tx_free(),
            socket::RX_RSR => self.sockets[sn.index()].rx_received(),
            _ => self.sockets[sn.index()].u16(offset),
        }
    }

    /// Moves both TX pointers, emptying the TX buffer.
    pub fn set_tx_pointers(&mut self, sn: SocketId, value: u16) {
        let model = &mut self.sockets[sn.index()];
        model.set_u16(socket::TX_RD, value);
        model.set_u16(socket::TX_WR, value);
    }

    /// Moves both RX pointers, emptying the RX buffer.
    pub fn set_rx_pointers(&mut self, sn: SocketId, value: u16) {
        let model = &mut self.sockets[sn.index()];
        model.set_u16(socket::RX_RD, value);
        model.set_u16(socket::RX_WR, value);
    }

    /// A remote client completes the handshake with a listening socket.
    pub fn peer_connect(&mut self, sn: SocketId) {
        let model = &mut self.sockets[sn.index()];
        if model.status() == SocketStatus::Listen {
            model.set_status(SocketStatus::Established);
            model.raise(SocketInterrupt::Connected);
        }
    }

    /// The remote side sends FIN.
    pub fn peer_disconnect(&mut self, sn: SocketId) {
        let model = &mut self.sockets[sn.index()];
        if model.status() == SocketStatus::Established {
            model.set_status(SocketStatus::CloseWait);
        }
        model.raise(SocketInterrupt::Disconnected);
    }

    /// Stream data arriving on a TCP socket
    pub fn peer_send(&mut self, sn: SocketId, data: &[u8]) {
        self.sockets[sn.index()].push_rx(data);
    }

    /// A UDP datagram, stored behind the controller's 8-byte receive header
    pub fn peer_send_datagram(&mut self, sn: SocketId, from: (Ipv4Addr, u16), data: &[u8]) {
        let mut packet = Vec::with_capacity(8 + data.len());
        packet.extend_from_slice(&from.0.octets());
        packet.extend_from_slice(&from.1.to_be_bytes());
        packet.extend_from_slice(&(data.len() as u16).to_be_bytes());
        packet.extend_from_slice(data);
        self.sockets[sn.index()].push_rx(&packet);
    }

    /// A link-layer frame, stored behind the controller's 2-byte length header
    pub fn peer_send_frame(&mut self, sn: SocketId, frame: &[u8]) {
        self.peer_send_frame_with_length(sn, frame, (frame.len() + 2) as u16);
    }

    /// A link-layer frame with an arbitrary length header
    pub fn peer_send_frame_with_length(&mut self, sn: SocketId, frame: &[u8], length: u16) {
        let mut packet = Vec::with_capacity(2 + frame.len());
        packet.extend_from_slice(&length.to_be_bytes());
        packet.extend_from_slice(frame);
        self.sockets[sn.index()].push_rx(&packet);
    }

    /// Payloads transmitted by `SEND` commands so far
    pub fn sent(&self, sn: SocketId) -> &[Vec<u8>] {
        &self.sockets[sn.index()].sent
    }

    pub fn take_sent(&mut self, sn: SocketId) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sockets[sn.index()].sent)
    }

    /// Raw command codes written to the command register
    pub fn commands(&self, sn: SocketId) -> &[u8] {
        &self.sockets[sn.index()].commands
    }

    pub fn keep_alive_sent(&self, sn: SocketId) -> usize {
        self.sockets[sn.index()].keep_alive_sent
    }

    pub fn set_connect_behavior(&mut self, sn: SocketId, behavior: ConnectBehavior) {
        self.sockets[sn.index()].connect = behavior;
    }

    /// When disabled, `SEND` does not raise `SEND_OK`.
    pub fn set_auto_send_ok(&mut self, enabled: bool) {
        self.auto_send_ok = enabled;
    }

    /// When enabled, the command register keeps the written command instead of self-clearing.
    pub fn stall_commands(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn set_link(&mut self, up: bool) {
        if up {
            self.link_status |= phy::LNK;
        } else {
            self.link_status &= !phy::LNK;
        }
    }

    /// Fails the next transaction with [`BusError::Transfer`].
    pub fn inject_fault(&mut self) {
        self.fault = true;
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    pub fn set_hook(&mut self, hook: Hook) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }
}

enum Access<'b> {
    Read(&'b mut [u8]),
    Write(&'b [u8]),
}

/// Shared handle to a simulated controller
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<State>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    /// Creates a bus attached to this controller.
    pub fn bus(&self) -> SimBus {
        SimBus {
            state: self.state.clone(),
        }
    }

    /// Locks the model. Do not hold the guard across stack calls.
    pub fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SimBus {
    state: Arc<Mutex<State>>,
}

impl SimBus {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Bus for SimBus {
    fn read(
        &mut self,
        header: &[u8; Header::LENGTH],
        data: &mut [u8],
    ) -> Result<(), BusError> {
        let len = data.len();
        self.lock()
            .transact(header, Direction::Read, len, Access::Read(data))
    }

    fn write(&mut self, header: &[u8; Header::LENGTH], data: &[u8]) -> Result<(), BusError> {
        self.lock()
            .transact(header, Direction::Write, data.len(), Access::Write(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Address;

    fn sn(value: u8) -> SocketId {
        SocketId::new(value).unwrap()
    }

    fn write(bus: &mut SimBus, address: Address, data: &[u8]) {
        bus.write(&Header::write(address).encode(), data).unwrap();
    }

    fn read<const N: usize>(bus: &mut SimBus, address: Address) -> [u8; N] {
        let mut data = [0; N];
        bus.read(&Header::read(address).encode(), &mut data).unwrap();
        data
    }

    #[test]
    fn test_version_and_reset() {
        let sim = Simulator::new();
        let mut bus = sim.bus();
        assert_eq!(read::<1>(&mut bus, Address::common(common::VERSIONR)), [0x04]);
        write(&mut bus, Address::common(common::SIPR), &[10, 0, 0, 2]);
        write(&mut bus, Address::common(common::MR), &[mode::RST]);
        assert_eq!(read::<4>(&mut bus, Address::common(common::SIPR)), [0; 4]);
        assert_eq!(read::<1>(&mut bus, Address::common(common::MR)), [0]);
    }

    #[test]
    fn test_open_send() {
        let sim = Simulator::new();
        let mut bus = sim.bus();
        let s0 = sn(0);
        write(&mut bus, Address::socket(s0, socket::MR), &[0x01]);
        write(&mut bus, Address::socket(s0, socket::CR), &[Command::Open.into_u8()]);
        assert_eq!(sim.lock().status(s0), SocketStatus::Init);
        assert_eq!(read::<2>(&mut bus, Address::socket(s0, socket::TX_FSR)), [0x08, 0x00]);

        write(&mut bus, Address::new(Block::Tx(s0), 0), b"hello");
        write(&mut bus, Address::socket(s0, socket::TX_WR), &[0x00, 0x05]);
        assert_eq!(read::<2>(&mut bus, Address::socket(s0, socket::TX_FSR)), [0x07, 0xfb]);
        write(&mut bus, Address::socket(s0, socket::CR), &[Command::Send.into_u8()]);
        assert_eq!(sim.lock().sent(s0), [b"hello".to_vec()]);
        assert!(sim.lock().interrupts(s0).contains(SocketInterrupt::SendOk));

        write(&mut bus, Address::socket(s0, socket::IR), &[0x10]);
        assert!(sim.lock().interrupts(s0).is_empty());
    }

    #[test]
    fn test_buffer_bounds() {
        let sim = Simulator::new();
        let mut bus = sim.bus();
        let header = Header::write(Address::new(Block::Tx(sn(1)), 2040)).encode();
        assert_eq!(bus.write(&header, &[0; 16]), Err(BusError::Transfer));
        assert_eq!(bus.write(&header, &[0; 8]), Ok(()));
    }

    #[test]
    fn test_socket_interrupt_summary() {
        let sim = Simulator::new();
        let mut bus = sim.bus();
        sim.lock().raise(sn(3), SocketInterrupt::Received);
        assert_eq!(read::<1>(&mut bus, Address::common(common::SIR)), [0b0000_1000]);
        write(&mut bus, Address::socket(sn(3), socket::IMR), &[0x00]);
        assert_eq!(read::<1>(&mut bus, Address::common(common::SIR)), [0]);
    }
}
