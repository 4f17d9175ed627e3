//! Interrupt line forwarding
//!
//! The system initializer owns an [`InterruptLines`] map from pin ids to the handlers that
//! service them and calls [`InterruptLines::dispatch`] from the pin interrupt. Handlers run in
//! interrupt context and must not block or touch the bus.

use heapless::LinearMap;

/// Receiver of a hardware interrupt
pub trait InterruptLine {
    /// Called in interrupt context.
    fn on_interrupt(&self);
}

/// Pin id to handler map
pub struct InterruptLines<'a, const N: usize> {
    lines: LinearMap<u16, &'a (dyn InterruptLine + Sync), N>,
}

impl<'a, const N: usize> Default for InterruptLines<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> InterruptLines<'a, N> {
    pub const fn new() -> Self {
        Self {
            lines: LinearMap::new(),
        }
    }

    /// Binds `line` to `pin`, replacing the previous binding.
    ///
    /// Returns the handler back when the map is full.
    pub fn register(
        &mut self,
        pin: u16,
        line: &'a (dyn InterruptLine + Sync),
    ) -> Result<(), &'a (dyn InterruptLine + Sync)> {
        self.lines.insert(pin, line).map(|_| ()).map_err(|(_, line)| line)
    }

    pub fn unregister(&mut self, pin: u16) -> bool {
        self.lines.remove(&pin).is_some()
    }

    pub fn is_registered(&self, pin: u16) -> bool {
        self.lines.contains_key(&pin)
    }

    /// Forwards an interrupt of `pin`. Returns `false` for unbound pins.
    pub fn dispatch(&self, pin: u16) -> bool {
        match self.lines.get(&pin) {
            Some(line) => {
                line.on_interrupt();
                true
            }
            None => {
                trace!("interrupt on unbound pin {}", pin);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl InterruptLine for Counter {
        fn on_interrupt(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_dispatch_by_pin() {
        let first = Counter::default();
        let second = Counter::default();
        let mut lines = InterruptLines::<2>::new();
        assert!(lines.register(4, &first).is_ok());
        assert!(lines.register(9, &second).is_ok());

        assert!(lines.dispatch(4));
        assert!(lines.dispatch(4));
        assert!(lines.dispatch(9));
        assert!(!lines.dispatch(5));
        assert_eq!(first.0.load(Ordering::Relaxed), 2);
        assert_eq!(second.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_register_full_and_unregister() {
        let counter = Counter::default();
        let mut lines = InterruptLines::<1>::new();
        assert!(lines.register(1, &counter).is_ok());
        assert!(lines.register(2, &counter).is_err());
        // Rebinding an existing pin does not need a free slot
        assert!(lines.register(1, &counter).is_ok());

        assert!(lines.unregister(1));
        assert!(!lines.is_registered(1));
        assert!(!lines.dispatch(1));
        assert!(lines.register(2, &counter).is_ok());
    }
}
