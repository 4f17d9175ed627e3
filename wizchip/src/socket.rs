//! Socket state machine
//!
//! The [`Sockets`] trait is the socket-lifecycle capability of a [`Chip`]. Operations take a
//! raw socket number and reject values outside `0..8` with `Error::SocketNumber` before any
//! bus access.
//!
//! In blocking IO mode `connect`, `disconnect`, `send`, `recv`, `send_to` and `recv_from` poll
//! the controller until the operation completes, the controller reports a timeout, or the
//! socket leaves the expected status. In non-blocking IO mode they return `Error::Busy`
//! instead of polling.

use core::net::{Ipv4Addr, SocketAddrV4};

use crate::chip::Chip;
use crate::core::regs::{self, socket};
use crate::core::{
    Command, InterruptSet, Protocol, SocketFlags, SocketId, SocketInterrupt, SocketStatus,
};
use crate::driver::Bus;
use crate::driver::frame::{Address, Block};
use crate::error::Error;
use crate::ring;

/// First local port assigned when a socket is opened with port 0
pub(crate) const ANY_PORT_START: u16 = 0xc000;
const ANY_PORT_END: u16 = 0xfff0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoMode {
    #[default]
    Blocking,
    NonBlocking,
}

/// Datagram read progress of a UDP or MACRAW socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackInfo(u8);

impl PackInfo {
    /// The last read finished a datagram
    pub const COMPLETED: Self = Self(0x00);
    /// The last read consumed a datagram header
    pub const FIRST: Self = Self(0x80);
    /// Part of the current datagram is still buffered
    pub const REMAINED: Self = Self(0x01);

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn is_first(&self) -> bool {
        self.0 & Self::FIRST.0 != 0
    }

    pub const fn is_remained(&self) -> bool {
        self.0 & Self::REMAINED.0 != 0
    }
}

/// Writable socket option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    Ttl(u8),
    Tos(u8),
    /// Maximum segment size
    Mss(u16),
    DestinationIp(Ipv4Addr),
    DestinationPort(u16),
    /// Sends one keep-alive segment and waits for it to be accepted (TCP only)
    KeepAliveSend,
    /// Automatic keep-alive period in 5 s units, 0 disables (TCP only)
    KeepAliveAuto(u8),
}

/// Host-side state of one socket
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SocketState {
    pub(crate) io_mode: IoMode,
    pub(crate) sending: bool,
    /// Sends confirmed by a later send rather than by interrupt service
    pub(crate) confirmed: u8,
    pub(crate) remained: u16,
    pub(crate) pack: PackInfo,
    pub(crate) peer: Option<SocketAddrV4>,
}

/// Socket-lifecycle capability
pub trait Sockets {
    /// Opens socket `sn`, closing it first if needed.
    ///
    /// Port 0 picks an ephemeral port. Returns the opened socket.
    fn socket(
        &mut self,
        sn: u8,
        protocol: Protocol,
        port: u16,
        flags: SocketFlags,
    ) -> Result<SocketId, Error>;

    /// Closes the socket and waits for the controller to report `Closed`.
    fn close(&mut self, sn: u8) -> Result<(), Error>;

    /// Puts an `Init` TCP socket in server mode.
    fn listen(&mut self, sn: u8) -> Result<(), Error>;

    /// Connects an `Init` TCP socket.
    ///
    /// A controller timeout closes the socket before returning `Error::Timeout`.
    fn connect(&mut self, sn: u8, remote: SocketAddrV4) -> Result<(), Error>;

    fn disconnect(&mut self, sn: u8) -> Result<(), Error>;

    /// Queues stream data for transmission and returns the accepted length.
    ///
    /// The length is clamped to the TX capacity and to the free space. Only one send may be in
    /// flight; a pending one is resolved through the socket interrupt register first.
    fn send(&mut self, sn: u8, data: &[u8]) -> Result<usize, Error>;

    /// Reads buffered stream data and returns its length.
    fn recv(&mut self, sn: u8, buf: &mut [u8]) -> Result<usize, Error>;

    /// Sends one datagram (UDP) or frame (MACRAW). `remote` is ignored for MACRAW.
    fn send_to(&mut self, sn: u8, data: &[u8], remote: SocketAddrV4) -> Result<usize, Error>;

    /// Reads (part of) the next datagram or frame.
    ///
    /// A datagram longer than `buf` is delivered over several calls; see [`Sockets::pack_info`].
    /// The source is `None` for MACRAW frames, which embed it in the payload.
    fn recv_from(
        &mut self,
        sn: u8,
        buf: &mut [u8],
    ) -> Result<(usize, Option<SocketAddrV4>), Error>;

    /// Drops `len` received bytes without reading them.
    fn discard(&mut self, sn: u8, len: u16) -> Result<(), Error>;

    fn set_io_mode(&mut self, sn: u8, mode: IoMode) -> Result<(), Error>;
    fn io_mode(&self, sn: u8) -> Result<IoMode, Error>;
    /// A send has been issued and not yet confirmed
    fn is_sending(&self, sn: u8) -> Result<bool, Error>;
    fn tx_capacity(&self, sn: u8) -> Result<usize, Error>;
    fn rx_capacity(&self, sn: u8) -> Result<usize, Error>;

    fn interrupts(&mut self, sn: u8) -> Result<InterruptSet, Error>;
    /// Acknowledges the given sources only. Undefined bits fail with `Error::Argument`.
    fn clear_interrupts(&mut self, sn: u8, kinds: InterruptSet) -> Result<(), Error>;
    fn interrupt_mask(&mut self, sn: u8) -> Result<InterruptSet, Error>;
    fn set_interrupt_mask(&mut self, sn: u8, mask: InterruptSet) -> Result<(), Error>;

    fn set_option(&mut self, sn: u8, option: SocketOption) -> Result<(), Error>;
    fn status(&mut self, sn: u8) -> Result<SocketStatus, Error>;
    fn protocol(&mut self, sn: u8) -> Result<Option<Protocol>, Error>;
    /// Mode register flags, plus `IO_NONBLOCK` for non-blocking sockets
    fn flags(&mut self, sn: u8) -> Result<SocketFlags, Error>;
    fn ttl(&mut self, sn: u8) -> Result<u8, Error>;
    fn tos(&mut self, sn: u8) -> Result<u8, Error>;
    fn mss(&mut self, sn: u8) -> Result<u16, Error>;
    fn destination(&mut self, sn: u8) -> Result<SocketAddrV4, Error>;
    fn keep_alive_timer(&mut self, sn: u8) -> Result<u8, Error>;
    fn tx_free_size(&mut self, sn: u8) -> Result<u16, Error>;
    fn rx_received_size(&mut self, sn: u8) -> Result<u16, Error>;
    /// TCP: buffered bytes. UDP and MACRAW: unread bytes of the current datagram.
    fn remaining_size(&mut self, sn: u8) -> Result<u16, Error>;
    /// Fails with `Error::SocketMode` for TCP sockets.
    fn pack_info(&mut self, sn: u8) -> Result<PackInfo, Error>;
}

pub(crate) fn socket_id(sn: u8) -> Result<SocketId, Error> {
    SocketId::new(sn).ok_or(Error::SocketNumber)
}

fn validate_flags(protocol: Protocol, flags: SocketFlags) -> Result<(), Error> {
    if flags.into_bits() & 0x04 != 0 {
        return Err(Error::SocketFlag);
    }
    if flags.is_empty() {
        return Ok(());
    }
    match protocol {
        Protocol::Tcp => {
            if !flags.intersects(SocketFlags::TCP_NODELAY | SocketFlags::IO_NONBLOCK) {
                return Err(Error::SocketFlag);
            }
        }
        Protocol::Udp => {
            let multicast = flags.contains(SocketFlags::MULTI_ENABLE);
            if flags.contains(SocketFlags::IGMP_VER2) && !multicast {
                return Err(Error::SocketFlag);
            }
            if flags.contains(SocketFlags::UNI_BLOCK) && !multicast {
                return Err(Error::SocketFlag);
            }
        }
        Protocol::MacRaw => {}
    }
    Ok(())
}

impl<B: Bus> Chip<B> {
    fn mode_protocol(&mut self, sn: SocketId) -> Result<Option<Protocol>, Error> {
        let mr = self.codec.socket_u8(sn, socket::MR)?;
        Ok(Protocol::from_mode(mr))
    }

    fn check_protocol(&mut self, sn: SocketId, expected: Protocol) -> Result<(), Error> {
        if self.mode_protocol(sn)? != Some(expected) {
            return Err(Error::SocketMode);
        }
        Ok(())
    }

    fn nonblocking(&self, sn: SocketId) -> bool {
        self.sockets[sn.index()].io_mode == IoMode::NonBlocking
    }

    fn socket_interrupt_set(&mut self, sn: SocketId) -> Result<InterruptSet, Error> {
        let ir = self.codec.socket_u8(sn, socket::IR)?;
        Ok(InterruptSet::from_bits_truncating(ir))
    }

    pub(crate) fn ack(&mut self, sn: SocketId, kind: SocketInterrupt) -> Result<(), Error> {
        let bits = InterruptSet::new_eq(kind).into_bits();
        Ok(self.codec.set_socket_u8(sn, socket::IR, bits)?)
    }

    fn free_size(&mut self, sn: SocketId) -> Result<usize, Error> {
        let free = self
            .codec
            .read_u16_settled(Address::socket(sn, socket::TX_FSR))?;
        Ok(usize::from(free))
    }

    pub(crate) fn received_size(&mut self, sn: SocketId) -> Result<usize, Error> {
        let received = self
            .codec
            .read_u16_settled(Address::socket(sn, socket::RX_RSR))?;
        Ok(usize::from(received))
    }

    pub(crate) fn close_socket(&mut self, sn: SocketId) -> Result<(), Error> {
        self.command(sn, Command::Close)?;
        self.codec.set_socket_u8(sn, socket::IR, 0xff)?;
        self.sockets[sn.index()] = SocketState::default();
        self.settle(sn, |status| status == SocketStatus::Closed)?;
        Ok(())
    }

    fn next_any_port(&mut self) -> u16 {
        let port = self.any_port;
        self.any_port = self.any_port.wrapping_add(1);
        if self.any_port == ANY_PORT_END {
            self.any_port = ANY_PORT_START;
        }
        port
    }

    /// Writes `data` at the TX write pointer and advances it.
    fn send_data(&mut self, sn: SocketId, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let pointer = self.codec.socket_u16(sn, socket::TX_WR)?;
        let ring = self.tx[sn.index()];
        let pointer = ring.write(&mut self.codec, Block::Tx(sn), pointer, data)?;
        Ok(self.codec.set_socket_u16(sn, socket::TX_WR, pointer)?)
    }

    /// Reads from the RX read pointer and advances it.
    fn recv_data(&mut self, sn: SocketId, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let pointer = self.codec.socket_u16(sn, socket::RX_RD)?;
        let ring = self.rx[sn.index()];
        let pointer = ring.read(&mut self.codec, Block::Rx(sn), pointer, buf)?;
        Ok(self.codec.set_socket_u16(sn, socket::RX_RD, pointer)?)
    }

    /// Settles the previous send, if any.
    fn resolve_sending(&mut self, sn: SocketId) -> Result<(), Error> {
        if !self.sockets[sn.index()].sending {
            return Ok(());
        }
        let pending = self.socket_interrupt_set(sn)?;
        if pending.contains(SocketInterrupt::SendOk) {
            self.ack(sn, SocketInterrupt::SendOk)?;
            let state = &mut self.sockets[sn.index()];
            state.sending = false;
            state.confirmed = state.confirmed.saturating_add(1);
            Ok(())
        } else if pending.contains(SocketInterrupt::Timeout) {
            warn!("socket {}: send timeout", sn.into_u8());
            self.close_socket(sn)?;
            Err(Error::Timeout)
        } else {
            Err(Error::Busy)
        }
    }

    /// Takes the count of sends confirmed outside interrupt service.
    pub(crate) fn take_confirmed(&mut self, sn: SocketId) -> u8 {
        core::mem::take(&mut self.sockets[sn.index()].confirmed)
    }

    /// Waits for `SEND_OK` after a datagram send.
    fn wait_send_ok(&mut self, sn: SocketId) -> Result<(), Error> {
        loop {
            let pending = self.socket_interrupt_set(sn)?;
            if pending.contains(SocketInterrupt::SendOk) {
                return self.ack(sn, SocketInterrupt::SendOk);
            }
            if pending.contains(SocketInterrupt::Timeout) {
                warn!("socket {}: send timeout", sn.into_u8());
                self.close_socket(sn)?;
                return Err(Error::Timeout);
            }
            if self.socket_status(sn)? == SocketStatus::Closed {
                self.close_socket(sn)?;
                return Err(Error::SocketClosed);
            }
        }
    }

    fn keep_alive_send(&mut self, sn: SocketId) -> Result<(), Error> {
        self.check_protocol(sn, Protocol::Tcp)?;
        if self.codec.socket_u8(sn, socket::KPALVTR)? != 0 {
            return Err(Error::SocketOption);
        }
        self.codec
            .set_socket_u8(sn, socket::CR, Command::SendKeep.into_u8())?;
        // The command stays pending until the segment is out or retransmission expires
        loop {
            if self.socket_interrupt_set(sn)?.contains(SocketInterrupt::Timeout) {
                self.ack(sn, SocketInterrupt::Timeout)?;
                self.close_socket(sn)?;
                return Err(Error::Timeout);
            }
            if self.codec.socket_u8(sn, socket::CR)? == 0 {
                return Ok(());
            }
        }
    }
}

impl<B: Bus> Sockets for Chip<B> {
    fn socket(
        &mut self,
        sn: u8,
        protocol: Protocol,
        port: u16,
        flags: SocketFlags,
    ) -> Result<SocketId, Error> {
        let sn = socket_id(sn)?;
        if protocol == Protocol::Tcp {
            let ip: [u8; 4] = self
                .codec
                .read_array(Address::common(regs::common::SIPR))?;
            if ip == [0; 4] {
                return Err(Error::SocketInit);
            }
        }
        validate_flags(protocol, flags)?;

        self.close_socket(sn)?;
        self.codec.set_socket_u8(
            sn,
            socket::MR,
            protocol.into_u8() | flags.mode_bits(),
        )?;
        let port = if port == 0 { self.next_any_port() } else { port };
        self.codec.set_socket_u16(sn, socket::PORT, port)?;
        self.command(sn, Command::Open)?;

        self.sockets[sn.index()] = SocketState {
            io_mode: if flags.contains(SocketFlags::IO_NONBLOCK) {
                IoMode::NonBlocking
            } else {
                IoMode::Blocking
            },
            ..Default::default()
        };
        self.settle(sn, |status| status != SocketStatus::Closed)?;
        debug!("socket {}: open {:?} on port {}", sn.into_u8(), protocol, port);
        Ok(sn)
    }

    fn close(&mut self, sn: u8) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        self.close_socket(sn)
    }

    fn listen(&mut self, sn: u8) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        if self.socket_status(sn)? != SocketStatus::Init {
            return Err(Error::SocketInit);
        }
        self.command(sn, Command::Listen)?;
        if self.socket_status(sn)? != SocketStatus::Listen {
            self.close_socket(sn)?;
            return Err(Error::SocketClosed);
        }
        Ok(())
    }

    fn connect(&mut self, sn: u8, remote: SocketAddrV4) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        if self.socket_status(sn)? != SocketStatus::Init {
            return Err(Error::SocketInit);
        }
        if remote.ip().is_unspecified() || remote.ip().is_broadcast() {
            return Err(Error::IpInvalid);
        }
        if remote.port() == 0 {
            return Err(Error::PortZero);
        }

        self.codec
            .write(Address::socket(sn, socket::DIPR), &remote.ip().octets())?;
        self.codec.set_socket_u16(sn, socket::DPORT, remote.port())?;
        self.command(sn, Command::Connect)?;
        if self.nonblocking(sn) {
            return Err(Error::Busy);
        }

        loop {
            let status = self.socket_status(sn)?;
            if status == SocketStatus::Established {
                return Ok(());
            }
            // The timeout flag is raised together with the drop to CLOSED
            if self.socket_interrupt_set(sn)?.contains(SocketInterrupt::Timeout) {
                self.ack(sn, SocketInterrupt::Timeout)?;
                warn!("socket {}: connect timeout", sn.into_u8());
                self.close_socket(sn)?;
                return Err(Error::Timeout);
            }
            if status == SocketStatus::Closed {
                return Err(Error::SocketClosed);
            }
        }
    }

    fn disconnect(&mut self, sn: u8) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        self.command(sn, Command::Disconnect)?;
        self.sockets[sn.index()].sending = false;
        if self.nonblocking(sn) {
            return Err(Error::Busy);
        }
        while self.socket_status(sn)? != SocketStatus::Closed {
            if self.socket_interrupt_set(sn)?.contains(SocketInterrupt::Timeout) {
                self.close_socket(sn)?;
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    fn send(&mut self, sn: u8, data: &[u8]) -> Result<usize, Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        if data.is_empty() {
            return Err(Error::DataLength);
        }
        if !self.socket_status(sn)?.is_connected() {
            return Err(Error::SocketStatus);
        }
        self.resolve_sending(sn)?;

        let capacity = self.tx[sn.index()].capacity();
        let len = loop {
            let free = self.free_size(sn)?;
            if !self.socket_status(sn)?.is_connected() {
                self.close_socket(sn)?;
                return Err(Error::SocketStatus);
            }
            if free > 0 {
                break data.len().min(capacity).min(free);
            }
            if self.nonblocking(sn) {
                return Err(Error::Busy);
            }
        };

        self.send_data(sn, &data[..len])?;
        self.command(sn, Command::Send)?;
        self.sockets[sn.index()].sending = true;
        trace!("socket {}: sent {} bytes", sn.into_u8(), len);
        Ok(len)
    }

    fn recv(&mut self, sn: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        if buf.is_empty() {
            return Err(Error::DataLength);
        }
        let len = buf.len().min(self.rx[sn.index()].capacity());

        let received = loop {
            let received = self.received_size(sn)?;
            let status = self.socket_status(sn)?;
            match status {
                SocketStatus::Established => {}
                SocketStatus::CloseWait => {
                    if received != 0 {
                        break received;
                    }
                    // Nothing left to read and nothing left to send
                    if self.free_size(sn)? == self.tx[sn.index()].capacity() {
                        self.close_socket(sn)?;
                        return Err(Error::SocketStatus);
                    }
                }
                _ => {
                    self.close_socket(sn)?;
                    return Err(Error::SocketStatus);
                }
            }
            if received != 0 {
                break received;
            }
            if self.nonblocking(sn) {
                return Err(Error::Busy);
            }
        };

        let len = len.min(received);
        self.recv_data(sn, &mut buf[..len])?;
        self.command(sn, Command::Recv)?;
        Ok(len)
    }

    fn send_to(&mut self, sn: u8, data: &[u8], remote: SocketAddrV4) -> Result<usize, Error> {
        let sn = socket_id(sn)?;
        let protocol = match self.mode_protocol(sn)? {
            Some(protocol @ (Protocol::Udp | Protocol::MacRaw)) => protocol,
            _ => return Err(Error::SocketMode),
        };
        if data.is_empty() {
            return Err(Error::DataLength);
        }
        if protocol == Protocol::Udp {
            if remote.ip().is_unspecified() {
                return Err(Error::IpInvalid);
            }
            if remote.port() == 0 {
                return Err(Error::PortZero);
            }
        }
        match self.socket_status(sn)? {
            SocketStatus::Udp | SocketStatus::MacRaw => {}
            _ => return Err(Error::SocketStatus),
        }
        self.resolve_sending(sn)?;

        if protocol == Protocol::Udp {
            self.codec
                .write(Address::socket(sn, socket::DIPR), &remote.ip().octets())?;
            self.codec.set_socket_u16(sn, socket::DPORT, remote.port())?;
        }

        let len = data.len().min(self.tx[sn.index()].capacity());
        loop {
            let free = self.free_size(sn)?;
            if self.socket_status(sn)? == SocketStatus::Closed {
                return Err(Error::SocketClosed);
            }
            if len <= free {
                break;
            }
            if self.nonblocking(sn) {
                return Err(Error::Busy);
            }
        }

        self.send_data(sn, &data[..len])?;
        self.command(sn, Command::Send)?;
        if self.nonblocking(sn) {
            self.sockets[sn.index()].sending = true;
        } else {
            self.wait_send_ok(sn)?;
        }
        Ok(len)
    }

    fn recv_from(
        &mut self,
        sn: u8,
        buf: &mut [u8],
    ) -> Result<(usize, Option<SocketAddrV4>), Error> {
        let sn = socket_id(sn)?;
        let protocol = match self.mode_protocol(sn)? {
            Some(protocol @ (Protocol::Udp | Protocol::MacRaw)) => protocol,
            _ => return Err(Error::SocketMode),
        };
        if buf.is_empty() {
            return Err(Error::DataLength);
        }

        if self.sockets[sn.index()].remained == 0 {
            loop {
                let received = self.received_size(sn)?;
                if self.socket_status(sn)? == SocketStatus::Closed {
                    self.close_socket(sn)?;
                    return Err(Error::SocketClosed);
                }
                if received != 0 {
                    break;
                }
                if self.nonblocking(sn) {
                    return Err(Error::Busy);
                }
            }

            match protocol {
                Protocol::Udp => {
                    let mut head = [0u8; regs::header::UDP];
                    self.recv_data(sn, &mut head)?;
                    self.command(sn, Command::Recv)?;
                    let length = u16::from_be_bytes([head[6], head[7]]);
                    if usize::from(length) > self.rx[sn.index()].capacity() {
                        error!("socket {}: invalid datagram length {}", sn.into_u8(), length);
                        self.close_socket(sn)?;
                        return Err(Error::PacketLength);
                    }
                    let state = &mut self.sockets[sn.index()];
                    state.peer = Some(SocketAddrV4::new(
                        Ipv4Addr::new(head[0], head[1], head[2], head[3]),
                        u16::from_be_bytes([head[4], head[5]]),
                    ));
                    state.remained = length;
                    state.pack = PackInfo::FIRST;
                }
                _ => {
                    let mut head = [0u8; regs::header::MACRAW];
                    self.recv_data(sn, &mut head)?;
                    self.command(sn, Command::Recv)?;
                    let total = usize::from(u16::from_be_bytes(head));
                    let frame = total.wrapping_sub(regs::header::MACRAW);
                    if total < regs::header::MACRAW || frame > regs::MAX_FRAME_LEN {
                        error!("socket {}: invalid frame length {}", sn.into_u8(), total);
                        self.close_socket(sn)?;
                        return Err(Error::PacketLength);
                    }
                    let state = &mut self.sockets[sn.index()];
                    state.peer = None;
                    state.remained = frame as u16;
                    state.pack = PackInfo::FIRST;
                }
            }
        }

        let len = buf.len().min(usize::from(self.sockets[sn.index()].remained));
        self.recv_data(sn, &mut buf[..len])?;
        self.command(sn, Command::Recv)?;

        let state = &mut self.sockets[sn.index()];
        state.remained -= len as u16;
        state.pack = if state.remained != 0 {
            PackInfo(state.pack.0 | PackInfo::REMAINED.0)
        } else {
            PackInfo::COMPLETED
        };
        Ok((len, state.peer))
    }

    fn discard(&mut self, sn: u8, len: u16) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        let pointer = self.codec.socket_u16(sn, socket::RX_RD)?;
        self.codec
            .set_socket_u16(sn, socket::RX_RD, ring::advance(pointer, usize::from(len)))?;
        self.command(sn, Command::Recv)
    }

    fn set_io_mode(&mut self, sn: u8, mode: IoMode) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        self.sockets[sn.index()].io_mode = mode;
        Ok(())
    }

    fn io_mode(&self, sn: u8) -> Result<IoMode, Error> {
        let sn = socket_id(sn)?;
        Ok(self.sockets[sn.index()].io_mode)
    }

    fn is_sending(&self, sn: u8) -> Result<bool, Error> {
        let sn = socket_id(sn)?;
        Ok(self.sockets[sn.index()].sending)
    }

    fn tx_capacity(&self, sn: u8) -> Result<usize, Error> {
        let sn = socket_id(sn)?;
        Ok(self.tx[sn.index()].capacity())
    }

    fn rx_capacity(&self, sn: u8) -> Result<usize, Error> {
        let sn = socket_id(sn)?;
        Ok(self.rx[sn.index()].capacity())
    }

    fn interrupts(&mut self, sn: u8) -> Result<InterruptSet, Error> {
        let sn = socket_id(sn)?;
        self.socket_interrupt_set(sn)
    }

    fn clear_interrupts(&mut self, sn: u8, kinds: InterruptSet) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        if kinds.into_bits() & !InterruptSet::ALL.into_bits() != 0 {
            return Err(Error::Argument);
        }
        Ok(self.codec.set_socket_u8(sn, socket::IR, kinds.into_bits())?)
    }

    fn interrupt_mask(&mut self, sn: u8) -> Result<InterruptSet, Error> {
        let sn = socket_id(sn)?;
        let imr = self.codec.socket_u8(sn, socket::IMR)?;
        Ok(InterruptSet::from_bits_truncating(imr))
    }

    fn set_interrupt_mask(&mut self, sn: u8, mask: InterruptSet) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        if mask.into_bits() & !InterruptSet::ALL.into_bits() != 0 {
            return Err(Error::Argument);
        }
        Ok(self.codec.set_socket_u8(sn, socket::IMR, mask.into_bits())?)
    }

    fn set_option(&mut self, sn: u8, option: SocketOption) -> Result<(), Error> {
        let sn = socket_id(sn)?;
        match option {
            SocketOption::Ttl(ttl) => self.codec.set_socket_u8(sn, socket::TTL, ttl)?,
            SocketOption::Tos(tos) => self.codec.set_socket_u8(sn, socket::TOS, tos)?,
            SocketOption::Mss(mss) => self.codec.set_socket_u16(sn, socket::MSSR, mss)?,
            SocketOption::DestinationIp(ip) => self
                .codec
                .write(Address::socket(sn, socket::DIPR), &ip.octets())?,
            SocketOption::DestinationPort(port) => {
                self.codec.set_socket_u16(sn, socket::DPORT, port)?
            }
            SocketOption::KeepAliveSend => self.keep_alive_send(sn)?,
            SocketOption::KeepAliveAuto(period) => {
                self.check_protocol(sn, Protocol::Tcp)?;
                self.codec.set_socket_u8(sn, socket::KPALVTR, period)?
            }
        }
        Ok(())
    }

    fn status(&mut self, sn: u8) -> Result<SocketStatus, Error> {
        let sn = socket_id(sn)?;
        self.socket_status(sn)
    }

    fn protocol(&mut self, sn: u8) -> Result<Option<Protocol>, Error> {
        let sn = socket_id(sn)?;
        self.mode_protocol(sn)
    }

    fn flags(&mut self, sn: u8) -> Result<SocketFlags, Error> {
        let sn = socket_id(sn)?;
        let mr = self.codec.socket_u8(sn, socket::MR)?;
        let mut flags = SocketFlags::from_bits(mr & 0xf0);
        if self.nonblocking(sn) {
            flags |= SocketFlags::IO_NONBLOCK;
        }
        Ok(flags)
    }

    fn ttl(&mut self, sn: u8) -> Result<u8, Error> {
        let sn = socket_id(sn)?;
        Ok(self.codec.socket_u8(sn, socket::TTL)?)
    }

    fn tos(&mut self, sn: u8) -> Result<u8, Error> {
        let sn = socket_id(sn)?;
        Ok(self.codec.socket_u8(sn, socket::TOS)?)
    }

    fn mss(&mut self, sn: u8) -> Result<u16, Error> {
        let sn = socket_id(sn)?;
        Ok(self.codec.socket_u16(sn, socket::MSSR)?)
    }

    fn destination(&mut self, sn: u8) -> Result<SocketAddrV4, Error> {
        let sn = socket_id(sn)?;
        let ip: [u8; 4] = self.codec.read_array(Address::socket(sn, socket::DIPR))?;
        let port = self.codec.socket_u16(sn, socket::DPORT)?;
        Ok(SocketAddrV4::new(Ipv4Addr::from(ip), port))
    }

    fn keep_alive_timer(&mut self, sn: u8) -> Result<u8, Error> {
        let sn = socket_id(sn)?;
        self.check_protocol(sn, Protocol::Tcp)?;
        Ok(self.codec.socket_u8(sn, socket::KPALVTR)?)
    }

    fn tx_free_size(&mut self, sn: u8) -> Result<u16, Error> {
        let sn = socket_id(sn)?;
        Ok(self.free_size(sn)? as u16)
    }

    fn rx_received_size(&mut self, sn: u8) -> Result<u16, Error> {
        let sn = socket_id(sn)?;
        Ok(self.received_size(sn)? as u16)
    }

    fn remaining_size(&mut self, sn: u8) -> Result<u16, Error> {
        let sn = socket_id(sn)?;
        if self.mode_protocol(sn)? == Some(Protocol::Tcp) {
            Ok(self.received_size(sn)? as u16)
        } else {
            Ok(self.sockets[sn.index()].remained)
        }
    }

    fn pack_info(&mut self, sn: u8) -> Result<PackInfo, Error> {
        let sn = socket_id(sn)?;
        if self.mode_protocol(sn)? == Some(Protocol::Tcp) {
            return Err(Error::SocketMode);
        }
        Ok(self.sockets[sn.index()].pack)
    }
}
