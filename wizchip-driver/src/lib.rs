//! Wizchip driver interface
//!
//! The crate provides an interface between an SPI bus implementation and the wizchip stack.
//! Limited scope facilitates compatibility across versions.
//! Bus adapter crates should depend on this crate. Wizchip stack users should depend on
//! the `wizchip` crate instead.
//!
//! A `Bus` performs one framed transaction at a time: chip select is asserted, the 3-byte
//! control header is shifted out, the data phase is read or written, then chip select is
//! released. The stack composes the header (see [`frame`]) so bus implementations stay
//! protocol-agnostic.
//!
//! The stack never retries a failed transaction. A bus reports faults as [`BusError`] and the
//! stack propagates them to the caller unchanged.
//!
//! With the `sim` feature the crate also provides an in-memory controller model that
//! implements `Bus` for host testing.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod frame;
#[cfg(feature = "sim")]
pub mod sim;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}

/// Bus transaction fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    #[error("bus transfer failed")]
    Transfer,
    #[error("chip select fault")]
    ChipSelect,
}

/// Exclusive-access framed transport
pub trait Bus {
    /// Shifts out `header`, then reads `data.len()` bytes within the same transaction.
    fn read(&mut self, header: &[u8; frame::Header::LENGTH], data: &mut [u8])
    -> Result<(), BusError>;

    /// Shifts out `header`, then writes `data` within the same transaction.
    fn write(&mut self, header: &[u8; frame::Header::LENGTH], data: &[u8]) -> Result<(), BusError>;
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn read(
        &mut self,
        header: &[u8; frame::Header::LENGTH],
        data: &mut [u8],
    ) -> Result<(), BusError> {
        B::read(self, header, data)
    }

    fn write(&mut self, header: &[u8; frame::Header::LENGTH], data: &[u8]) -> Result<(), BusError> {
        B::write(self, header, data)
    }
}
