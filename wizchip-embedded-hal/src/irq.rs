use crate::config::Config;
use crate::spi::SpiBus;
use embassy_futures::select::{Either, select};
use embassy_time::Timer;
use embedded_hal::spi::SpiDevice;
use embedded_hal_async::digital::Wait;
use wizchip::irq::InterruptLine;

/// Splits the controller wiring into the stack bus and the interrupt runner.
///
/// `line` is usually the [`Interface`](wizchip::Interface) that owns the controller.
pub fn bind<'a, D: SpiDevice, P: Wait>(
    spi: D,
    pin: P,
    line: &'a (dyn InterruptLine + Sync),
    config: Config,
) -> (SpiBus<D>, IrqRunner<'a, P>) {
    (SpiBus::new(spi), IrqRunner::new(pin, line, config))
}

/// Follows the active-low INTn pin and signals the interrupt line on each assertion
pub struct IrqRunner<'a, P> {
    pin: P,
    line: &'a (dyn InterruptLine + Sync),
    config: Config,
}

impl<'a, P: Wait> IrqRunner<'a, P> {
    pub fn new(pin: P, line: &'a (dyn InterruptLine + Sync), config: Config) -> Self {
        Self { pin, line, config }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            if self.pin.wait_for_low().await.is_err() {
                self.backoff().await;
                continue;
            }
            self.line.on_interrupt();

            let released = match self.config.retrigger {
                Some(period) => match select(self.pin.wait_for_high(), Timer::after(period)).await
                {
                    Either::First(res) => res,
                    Either::Second(()) => {
                        trace!("interrupt line still asserted");
                        Ok(())
                    }
                },
                None => self.pin.wait_for_high().await,
            };
            if released.is_err() {
                self.backoff().await;
            }
        }
    }

    async fn backoff(&self) {
        error!("interrupt pin fault");
        Timer::after(self.config.fault_backoff).await;
    }
}
