//! # Wizchip
//!
//! This library provides a socket API for the WIZnet W5500 Ethernet controller in no_std
//! environments. The controller implements TCP, UDP and raw Ethernet in hardware and exposes
//! 8 sockets that share 16 KB of TX and 16 KB of RX buffer memory. The library speaks the
//! controller's SPI register protocol and turns its interrupt line into socket events.
//!
//! The library primarily targets the Embassy async framework. It requires no dynamic memory
//! allocation; the application provides the queue, registry and RX pool storage.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   ┌───────────┐
//!  │ IRQ line ├──►│ Interface │◄── application tasks
//!  └──────────┘   └─────┬─────┘
//!                       ▼
//!                 ┌────────────┐      ┌──────────┐
//!                 │ Dispatcher ├─────►│  Worker  │
//!                 └────────────┘      └────┬─────┘
//!                                          ▼
//!  ┌──────────┐   ┌─────────┐         ┌─────────┐   ┌──────┐   ┌─────┐
//!  │ Handlers │◄──┤ Registry│◄────────┤ Station ├──►│ Chip ├──►│ Bus │
//!  └──────────┘   └─────────┘         └─────────┘   └──────┘   └─────┘
//! ```
//! Components:
//! * _Chip_ owns the bus and the host-side socket state. It implements chip control and,
//!   through the [`Sockets`](socket::Sockets) trait, the socket state machine.
//! * _Codec_ composes the 3-byte control phase of each SPI transaction.
//! * _Ring buffers_ map each socket's TX and RX regions and split transfers that wrap around.
//! * _Dispatcher_ is a bounded FIFO of deferred requests with task and interrupt producers.
//! * _Worker_ is the sole consumer of the dispatcher and the only context touching the bus.
//! * _Station_ is the worker context: the chip, the registry reference and the RX pool.
//! * _Registry_ tracks socket allocation and the event handler bound to each socket.
//! * _Interface_ is a shared handle for allocating, opening and closing sockets and for
//!   requesting interrupt service.
//! * _InterruptLines_ maps interrupt pins to the interfaces that service them.
//!
//! ## Concurrency model
//!
//! Requests execute strictly in arrival order on the worker. A blocking socket operation
//! delays all requests queued behind it until it completes or the controller reports a
//! timeout. Interrupt context only enqueues; a full queue at that point is fatal because a
//! lost service request would leave interrupt acknowledgment out of step. Service requests
//! coalesce: while one is queued, further interrupts enqueue nothing.
//!
//! The registry mutex follows the `embassy_sync` options:
//! * _CriticalSectionRawMutex_ allows interfaces to be used at different interrupt levels.
//! * _ThreadModeRawMutex_ requires all users to run in a thread (non-interrupt) executor.
//!
//! ## Limitations
//!
//! * Buffer partition is fixed at construction.
//! * IPv6 and the W6100 register map are not supported.
//! * DHCP and PPPoE negotiation are left to the application.
#![no_std]

pub use wizchip_core as core;
pub use wizchip_driver as driver;
pub use wizchip_driver::time;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod chip;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod interface;
pub mod irq;
pub mod registry;
pub mod ring;
pub mod socket;

pub use chip::Chip;
pub use config::Config;
pub use error::Error;
pub use interface::{Interface, SocketEvent, SocketHandler, Station};
pub use socket::Sockets;
