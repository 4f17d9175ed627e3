//! embedded-hal adapter for the wizchip stack
//!
//! This adapter connects a W5500 controller wired to an `embedded-hal` SPI device and an
//! `embedded-hal-async` interrupt pin to the wizchip stack.
//!
//! # Features
//!
//! * Any [`SpiDevice`](embedded_hal::spi::SpiDevice) with chip select management serves as
//!   the controller bus; the control header and the data phase share one transaction
//! * The active-low INTn line is followed by an async runner that requests interrupt service
//! * Optional retrigger while the line stays asserted
//!
//! # Limitations
//!
//! * Variable data length mode only; the controller must own its chip select line
//! * The bus is blocking; each transaction holds the SPI device until it completes
//! * The interrupt runner signals from task context, so service latency follows the executor

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
mod irq;
mod spi;

pub use irq::{IrqRunner, bind};
pub use spi::SpiBus;
