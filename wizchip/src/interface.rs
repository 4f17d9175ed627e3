//! Application interface
//!
//! [`Station`] is the worker context: it owns the [`Chip`] and a host-side RX pool and
//! executes queued requests. [`Interface`] is a shared handle that application tasks and the
//! interrupt line use to queue those requests. Results are delivered to the
//! [`SocketHandler`] bound to the socket.
//!
//! ```text
//! ┌──────────────┐  ┌────────────┐  ┌────────┐  ┌─────────┐  ┌──────┐
//! │ IRQ / tasks  ├─►│ Interface  ├─►│ Queue  ├─►│ Station ├─►│ Chip │
//! └──────────────┘  └─────┬──────┘  └────────┘  └────┬────┘  └──────┘
//!                         ▼                          ▼
//!                   ┌──────────┐              ┌──────────────┐
//!                   │ Registry │◄─────────────┤ SocketHandler│
//!                   └──────────┘              └──────────────┘
//! ```

use core::net::SocketAddrV4;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::chip::Chip;
use crate::core::{InterruptSet, Protocol, SocketFlags, SocketId, SocketInterrupt, SocketStatus};
use crate::dispatch::{Deferred, Dispatcher, Worker};
use crate::driver::Bus;
use crate::error::{ConfigError, DispatchError, Error, RequestError};
use crate::irq::InterruptLine;
use crate::registry::{Binding, Registry};
use crate::socket::Sockets;

/// Notification delivered on the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEvent<'d> {
    /// A TCP connection was established
    Connected,
    /// The peer closed the connection. A bound TCP socket is listening again.
    Disconnected,
    /// Data drained from the controller. `from` is set for UDP datagrams.
    Received {
        data: &'d [u8],
        from: Option<SocketAddrV4>,
    },
    /// An issued send completed
    TxComplete,
    /// The retransmission timer expired
    Timeout,
    /// A queued request failed
    Error(Error),
}

/// Event sink of a socket
///
/// Runs on the worker with exclusive access to the controller, so a handler may respond
/// through `sockets` without queueing.
pub trait SocketHandler {
    fn on_event(&self, sn: SocketId, event: SocketEvent<'_>, sockets: &mut dyn Sockets);
}

/// Worker context
pub struct Station<'a, M: RawMutex, B> {
    chip: Chip<B>,
    registry: &'a Registry<'a, M>,
    rx_pool: &'a mut [u8],
}

/// Worker executing [`Station`] requests
pub type StationWorker<'a, M, B, const N: usize> = Worker<'a, M, Station<'a, M, B>, N>;

/// Request queue of a [`Station`]
pub type StationQueue<'a, M, B, const N: usize> = Dispatcher<M, Station<'a, M, B>, N>;

impl<'a, M: RawMutex, B: Bus> Station<'a, M, B> {
    /// `rx_pool` is partitioned like the controller RX memory and must cover it.
    pub fn new(
        chip: Chip<B>,
        registry: &'a Registry<'a, M>,
        rx_pool: &'a mut [u8],
    ) -> Result<Self, ConfigError> {
        let required = SocketId::all()
            .map(|sn| chip.rx_buffer(sn).range().end)
            .max()
            .unwrap_or(0);
        if rx_pool.len() < required {
            return Err(ConfigError::RxPool);
        }
        Ok(Self {
            chip,
            registry,
            rx_pool,
        })
    }

    pub fn chip(&mut self) -> &mut Chip<B> {
        &mut self.chip
    }

    pub fn registry(&self) -> &'a Registry<'a, M> {
        self.registry
    }

    pub fn into_chip(self) -> Chip<B> {
        self.chip
    }

    /// Opens the socket with its registry binding.
    pub fn open_request(&mut self, arg: usize) {
        let Some(sn) = request_socket(arg) else {
            return;
        };
        if let Err(err) = self.open(sn) {
            warn!("socket {}: open failed: {:?}", sn.into_u8(), err);
            notify(self.registry, &mut self.chip, sn, SocketEvent::Error(err));
        }
    }

    pub fn listen_request(&mut self, arg: usize) {
        let Some(sn) = request_socket(arg) else {
            return;
        };
        if let Err(err) = self.listen(sn) {
            warn!("socket {}: listen failed: {:?}", sn.into_u8(), err);
            notify(self.registry, &mut self.chip, sn, SocketEvent::Error(err));
        }
    }

    /// Closes the socket. On failure the socket is marked in use again.
    pub fn close_request(&mut self, arg: usize) {
        let Some(sn) = request_socket(arg) else {
            return;
        };
        match self.chip.close_socket(sn) {
            Ok(()) => {
                self.registry.set_status(sn, SocketStatus::Closed);
                debug!("socket {}: closed", sn.into_u8());
            }
            Err(err) => {
                error!("socket {}: close failed: {:?}", sn.into_u8(), err);
                self.registry.claim(sn);
                notify(self.registry, &mut self.chip, sn, SocketEvent::Error(err));
            }
        }
    }

    /// Services every socket with a pending interrupt.
    pub fn service_interrupt(&mut self, _arg: usize) {
        // Interrupts raised from here on need a new request
        self.registry.clear_service_pending();
        let pending = match self.chip.socket_interrupts() {
            Ok(pending) => pending,
            Err(err) => {
                error!("interrupt service failed: {:?}", err);
                return;
            }
        };
        for sn in pending {
            if let Err(err) = self.service_socket(sn) {
                warn!("socket {}: interrupt service failed: {:?}", sn.into_u8(), err);
                notify(self.registry, &mut self.chip, sn, SocketEvent::Error(err));
            }
        }
    }

    fn open(&mut self, sn: SocketId) -> Result<(), Error> {
        let binding = self.registry.binding(sn).ok_or(Error::SocketInit)?;
        self.chip
            .socket(sn.into_u8(), binding.protocol, binding.port, binding.flags)?;
        self.chip.set_interrupt_mask(sn.into_u8(), InterruptSet::ALL)?;
        let status = self.chip.socket_status(sn)?;
        self.registry.set_status(sn, status);
        Ok(())
    }

    fn listen(&mut self, sn: SocketId) -> Result<(), Error> {
        self.chip.listen(sn.into_u8())?;
        self.registry.set_status(sn, SocketStatus::Listen);
        debug!("socket {}: listening", sn.into_u8());
        Ok(())
    }

    /// Handles one interrupt snapshot of `sn`, acknowledging each serviced source only.
    fn service_socket(&mut self, sn: SocketId) -> Result<(), Error> {
        let pending = self.chip.interrupts(sn.into_u8())?;
        trace!("socket {}: interrupts {:#x}", sn.into_u8(), pending.into_bits());

        if pending.contains(SocketInterrupt::Disconnected) {
            // Data that arrived ahead of the FIN is lost on close
            if pending.contains(SocketInterrupt::Received) {
                self.drain(sn)?;
            }
            // Closing clears the remaining sources as well
            return self.disconnected(sn);
        }
        if pending.contains(SocketInterrupt::Connected) {
            self.chip.ack(sn, SocketInterrupt::Connected)?;
            let remote = self.chip.destination(sn.into_u8())?;
            self.registry.set_status(sn, SocketStatus::Established);
            self.registry.set_remote(sn, Some(remote));
            notify(self.registry, &mut self.chip, sn, SocketEvent::Connected);
        }
        if pending.contains(SocketInterrupt::Received) {
            self.drain(sn)?;
        }
        if pending.contains(SocketInterrupt::Timeout) {
            self.chip.sockets[sn.index()].sending = false;
            self.chip.ack(sn, SocketInterrupt::Timeout)?;
            let status = self.chip.socket_status(sn)?;
            self.registry.set_status(sn, status);
            notify(self.registry, &mut self.chip, sn, SocketEvent::Timeout);
        }
        if pending.contains(SocketInterrupt::SendOk) {
            self.chip.sockets[sn.index()].sending = false;
            self.chip.ack(sn, SocketInterrupt::SendOk)?;
            notify(self.registry, &mut self.chip, sn, SocketEvent::TxComplete);
        }
        Ok(())
    }

    fn disconnected(&mut self, sn: SocketId) -> Result<(), Error> {
        self.chip.close_socket(sn)?;
        self.registry.set_status(sn, SocketStatus::Closed);
        self.registry.set_remote(sn, None);
        notify(self.registry, &mut self.chip, sn, SocketEvent::Disconnected);

        match self.registry.binding(sn) {
            Some(binding) if binding.protocol == Protocol::Tcp && self.registry.is_in_use(sn) => {
                self.open(sn)?;
                self.listen(sn)
            }
            _ => Ok(()),
        }
    }

    /// Delivers buffered data until the controller reports none left.
    fn drain(&mut self, sn: SocketId) -> Result<(), Error> {
        let range = self.chip.rx_buffer(sn).range();
        let registry = self.registry;
        let chip = &mut self.chip;
        let slot = &mut self.rx_pool[range];
        let stream = chip.protocol(sn.into_u8())? == Some(Protocol::Tcp);
        loop {
            while chip.received_size(sn)? > 0 {
                let (len, from) = if stream {
                    (chip.recv(sn.into_u8(), slot)?, None)
                } else {
                    let (len, from) = chip.recv_from(sn.into_u8(), slot)?;
                    registry.set_remote(sn, from);
                    (len, from)
                };
                trace!("socket {}: received {} bytes", sn.into_u8(), len);
                let data = &slot[..len];
                notify(registry, chip, sn, SocketEvent::Received { data, from });
            }
            chip.ack(sn, SocketInterrupt::Received)?;
            // Data may have arrived between the last read and the acknowledgment
            if chip.received_size(sn)? == 0 {
                return Ok(());
            }
        }
    }
}

fn request_socket(arg: usize) -> Option<SocketId> {
    let sn = u8::try_from(arg).ok().and_then(SocketId::new);
    if sn.is_none() {
        error!("request for invalid socket {}", arg);
    }
    sn
}

/// Calls the handler bound to `sn`, if the socket is in use.
fn notify<M: RawMutex, B: Bus>(
    registry: &Registry<'_, M>,
    chip: &mut Chip<B>,
    sn: SocketId,
    event: SocketEvent<'_>,
) {
    if !registry.is_in_use(sn) {
        return;
    }
    let Some(handler) = registry.handler(sn) else {
        return;
    };
    handler.on_event(sn, event, chip);
    // A send issued by the handler may have consumed the completion of an earlier one
    loop {
        let confirmed = chip.take_confirmed(sn);
        if confirmed == 0 {
            return;
        }
        for _ in 0..confirmed {
            handler.on_event(sn, SocketEvent::TxComplete, chip);
        }
    }
}

/// Shared handle for queueing socket requests
pub struct Interface<'a, M: RawMutex, B, const N: usize> {
    registry: &'a Registry<'a, M>,
    queue: &'a StationQueue<'a, M, B, N>,
}

impl<'a, M: RawMutex, B, const N: usize> Clone for Interface<'a, M, B, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, M: RawMutex, B, const N: usize> Copy for Interface<'a, M, B, N> {}

impl<'a, M: RawMutex, B: Bus, const N: usize> Interface<'a, M, B, N> {
    pub const fn new(registry: &'a Registry<'a, M>, queue: &'a StationQueue<'a, M, B, N>) -> Self {
        Self { registry, queue }
    }

    pub fn registry(&self) -> &'a Registry<'a, M> {
        self.registry
    }

    /// Allocates a socket, binds `handler` and queues its opening.
    pub fn init_port(
        &self,
        port: u16,
        protocol: Protocol,
        handler: &'a (dyn SocketHandler + Sync),
    ) -> Result<SocketId, RequestError> {
        self.init_binding(Binding {
            protocol,
            port,
            flags: SocketFlags::NONE,
            handler: Some(handler),
        })
    }

    pub fn init_binding(&self, binding: Binding<'a>) -> Result<SocketId, RequestError> {
        let sn = self.registry.allocate()?;
        self.registry.bind(sn, binding);
        if let Err(err) = self.open(sn) {
            self.registry.release(sn);
            return Err(err);
        }
        Ok(sn)
    }

    /// Queues the opening of a bound socket, followed by a listen for TCP.
    pub fn open(&self, sn: SocketId) -> Result<(), RequestError> {
        let binding = self.registry.binding(sn).ok_or(RequestError::Unbound)?;
        self.queue
            .try_request(Deferred::new(Station::open_request, sn.index()))?;
        if binding.protocol == Protocol::Tcp {
            self.queue
                .try_request(Deferred::new(Station::listen_request, sn.index()))?;
        }
        Ok(())
    }

    /// Frees the socket and queues the hardware close.
    ///
    /// The socket is reported free immediately. It is marked in use again if the request
    /// cannot be queued or the close fails.
    pub fn close(&self, sn: SocketId) -> Result<(), RequestError> {
        self.registry.release(sn);
        if let Err(err) = self
            .queue
            .try_request(Deferred::new(Station::close_request, sn.index()))
        {
            error!("socket {}: close not queued", sn.into_u8());
            self.registry.claim(sn);
            return Err(err.into());
        }
        Ok(())
    }

    /// Queues an interrupt service request from task context.
    ///
    /// Does nothing if a service request is already queued.
    pub fn request_service(&self) -> Result<(), DispatchError> {
        if !self.registry.mark_service_pending() {
            return Ok(());
        }
        let result = self
            .queue
            .try_request(Deferred::new(Station::service_interrupt, 0));
        if result.is_err() {
            self.registry.clear_service_pending();
        }
        result
    }

    /// Queues an application request, waiting for a free slot.
    pub async fn request(&self, request: Deferred<Station<'a, M, B>>) {
        self.queue.request(request).await
    }
}

impl<'a, M: RawMutex, B: Bus, const N: usize> InterruptLine for Interface<'a, M, B, N> {
    /// Queues interrupt service unless a request is already waiting.
    fn on_interrupt(&self) {
        if self.registry.mark_service_pending() {
            self.queue
                .request_from_isr(Deferred::new(Station::service_interrupt, 0))
        }
    }
}
