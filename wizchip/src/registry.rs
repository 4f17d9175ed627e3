//! Socket registry
//!
//! Tracks which sockets are owned by the application and which handler receives their
//! events. The in-use flag is a single atomic word so that a release may race with the
//! worker; all other fields are only written by the worker or before a request is queued.
//!
//! The registry also holds the interrupt service flag shared by the interface and the
//! worker, so that at most one service request is queued at a time.

use core::cell::Cell;
use core::net::SocketAddrV4;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

use crate::core::{Protocol, SOCKET_COUNT, SocketFlags, SocketId, SocketStatus};
use crate::error::RegistryError;
use crate::interface::SocketHandler;

/// Application settings of an allocated socket
#[derive(Clone, Copy)]
pub struct Binding<'a> {
    pub protocol: Protocol,
    pub port: u16,
    pub flags: SocketFlags,
    pub handler: Option<&'a (dyn SocketHandler + Sync)>,
}

#[derive(Clone, Copy)]
struct Record<'a> {
    binding: Option<Binding<'a>>,
    status: SocketStatus,
    remote: Option<SocketAddrV4>,
}

impl Record<'_> {
    const EMPTY: Self = Self {
        binding: None,
        status: SocketStatus::Closed,
        remote: None,
    };
}

pub struct Registry<'a, M: RawMutex> {
    in_use: [AtomicBool; SOCKET_COUNT],
    records: [Mutex<M, Cell<Record<'a>>>; SOCKET_COUNT],
    service_pending: Mutex<M, Cell<bool>>,
}

impl<'a, M: RawMutex> Default for Registry<'a, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: RawMutex> Registry<'a, M> {
    pub const fn new() -> Self {
        Self {
            in_use: [const { AtomicBool::new(false) }; SOCKET_COUNT],
            records: [const { Mutex::new(Cell::new(Record::EMPTY)) }; SOCKET_COUNT],
            service_pending: Mutex::new(Cell::new(false)),
        }
    }

    /// Claims the lowest-numbered closed socket that is not in use.
    pub fn allocate(&self) -> Result<SocketId, RegistryError> {
        for sn in SocketId::all() {
            let claimed = self.records[sn.index()].lock(|cell| {
                let free = !self.in_use[sn.index()].load(Ordering::Acquire)
                    && cell.get().status == SocketStatus::Closed;
                if free {
                    self.in_use[sn.index()].store(true, Ordering::Release);
                }
                free
            });
            if claimed {
                return Ok(sn);
            }
        }
        Err(RegistryError::NoFreeSocket)
    }

    /// Marks the socket in use regardless of its previous owner.
    pub fn claim(&self, sn: SocketId) {
        self.in_use[sn.index()].store(true, Ordering::Release);
    }

    /// Marks the socket free and closed ahead of the hardware close.
    pub fn release(&self, sn: SocketId) {
        self.in_use[sn.index()].store(false, Ordering::Release);
        self.update(sn, |record| {
            record.status = SocketStatus::Closed;
            record.remote = None;
        });
    }

    pub fn is_in_use(&self, sn: SocketId) -> bool {
        self.in_use[sn.index()].load(Ordering::Acquire)
    }

    pub fn bind(&self, sn: SocketId, binding: Binding<'a>) {
        self.update(sn, |record| record.binding = Some(binding));
    }

    pub fn binding(&self, sn: SocketId) -> Option<Binding<'a>> {
        self.records[sn.index()].lock(|cell| cell.get().binding)
    }

    pub fn handler(&self, sn: SocketId) -> Option<&'a (dyn SocketHandler + Sync)> {
        self.binding(sn).and_then(|binding| binding.handler)
    }

    /// Last status observed by the worker
    pub fn status(&self, sn: SocketId) -> SocketStatus {
        self.records[sn.index()].lock(|cell| cell.get().status)
    }

    pub fn set_status(&self, sn: SocketId, status: SocketStatus) {
        self.update(sn, |record| record.status = status);
    }

    /// Peer of the current connection or the last datagram
    pub fn remote(&self, sn: SocketId) -> Option<SocketAddrV4> {
        self.records[sn.index()].lock(|cell| cell.get().remote)
    }

    pub fn set_remote(&self, sn: SocketId, remote: Option<SocketAddrV4>) {
        self.update(sn, |record| record.remote = remote);
    }

    /// Flags interrupt service as queued. Returns `false` if it already was.
    pub fn mark_service_pending(&self) -> bool {
        !self.service_pending.lock(|pending| pending.replace(true))
    }

    /// Clears the service flag; the worker calls this before reading pending interrupts.
    pub fn clear_service_pending(&self) {
        self.service_pending.lock(|pending| pending.set(false))
    }

    fn update(&self, sn: SocketId, f: impl FnOnce(&mut Record<'a>)) {
        self.records[sn.index()].lock(|cell| {
            let mut record = cell.get();
            f(&mut record);
            cell.set(record);
        })
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::collections::BTreeSet;

    #[test]
    fn test_allocate_until_exhausted() {
        let registry = Registry::<CriticalSectionRawMutex>::new();
        let ids: BTreeSet<u8> = (0..SOCKET_COUNT)
            .map(|_| registry.allocate().unwrap().into_u8())
            .collect();
        assert_eq!(ids.len(), SOCKET_COUNT);
        assert_eq!(registry.allocate(), Err(RegistryError::NoFreeSocket));

        let sn = SocketId::new(5).unwrap();
        registry.release(sn);
        assert_eq!(registry.allocate(), Ok(sn));
        assert_eq!(registry.allocate(), Err(RegistryError::NoFreeSocket));
    }

    #[test]
    fn test_lowest_free_first() {
        let registry = Registry::<CriticalSectionRawMutex>::new();
        registry.claim(SocketId::MIN);
        registry.set_status(SocketId::new(1).unwrap(), SocketStatus::Listen);
        assert_eq!(registry.allocate(), Ok(SocketId::new(2).unwrap()));
    }

    #[test]
    fn test_service_requests_coalesce() {
        let registry = Registry::<CriticalSectionRawMutex>::new();
        assert!(registry.mark_service_pending());
        assert!(!registry.mark_service_pending());
        assert!(!registry.mark_service_pending());
        registry.clear_service_pending();
        assert!(registry.mark_service_pending());
    }

    #[test]
    fn test_release_resets_mirror() {
        let registry = Registry::<CriticalSectionRawMutex>::new();
        let sn = registry.allocate().unwrap();
        registry.bind(
            sn,
            Binding {
                protocol: Protocol::Udp,
                port: 5000,
                flags: SocketFlags::NONE,
                handler: None,
            },
        );
        registry.set_status(sn, SocketStatus::Udp);
        registry.release(sn);
        assert!(!registry.is_in_use(sn));
        assert_eq!(registry.status(sn), SocketStatus::Closed);
        assert_eq!(registry.binding(sn).map(|binding| binding.port), Some(5000));
    }
}
