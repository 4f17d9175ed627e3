use embedded_hal::spi::{Error as _, ErrorKind, Operation, SpiDevice};
use wizchip_driver::frame::Header;
use wizchip_driver::{Bus, BusError};

/// Controller bus over an `embedded-hal` SPI device
///
/// The device asserts chip select for the whole transaction; the header and the data phase
/// are issued as two operations of a single transaction.
pub struct SpiBus<D> {
    spi: D,
}

impl<D: SpiDevice> SpiBus<D> {
    pub fn new(spi: D) -> Self {
        Self { spi }
    }

    pub fn release(self) -> D {
        self.spi
    }
}

impl<D: SpiDevice> Bus for SpiBus<D> {
    fn read(&mut self, header: &[u8; Header::LENGTH], data: &mut [u8]) -> Result<(), BusError> {
        self.spi
            .transaction(&mut [Operation::Write(header), Operation::Read(data)])
            .map_err(bus_error)
    }

    fn write(&mut self, header: &[u8; Header::LENGTH], data: &[u8]) -> Result<(), BusError> {
        self.spi
            .transaction(&mut [Operation::Write(header), Operation::Write(data)])
            .map_err(bus_error)
    }
}

fn bus_error(err: impl embedded_hal::spi::Error) -> BusError {
    match err.kind() {
        ErrorKind::ChipSelectFault => {
            warn!("spi chip select fault");
            BusError::ChipSelect
        }
        _ => {
            warn!("spi transfer fault");
            BusError::Transfer
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use embedded_hal::spi::ErrorType;
    use std::vec;
    use std::vec::Vec;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Write(Vec<u8>),
        Read(usize),
    }

    #[derive(Debug)]
    struct FakeError(ErrorKind);

    impl embedded_hal::spi::Error for FakeError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[derive(Default)]
    struct FakeSpi {
        transactions: Vec<Vec<Op>>,
        fill: u8,
        fault: Option<ErrorKind>,
    }

    impl ErrorType for FakeSpi {
        type Error = FakeError;
    }

    impl SpiDevice for FakeSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), FakeError> {
            if let Some(kind) = self.fault {
                return Err(FakeError(kind));
            }
            let mut ops = Vec::new();
            for op in operations {
                match op {
                    Operation::Write(bytes) => ops.push(Op::Write(bytes.to_vec())),
                    Operation::Read(buf) => {
                        buf.fill(self.fill);
                        ops.push(Op::Read(buf.len()));
                    }
                    _ => unimplemented!(),
                }
            }
            self.transactions.push(ops);
            Ok(())
        }
    }

    #[test]
    fn test_read_single_transaction() {
        let mut bus = SpiBus::new(FakeSpi {
            fill: 0x5a,
            ..Default::default()
        });
        let mut data = [0u8; 4];
        bus.read(&[0x00, 0x39, 0x00], &mut data).unwrap();
        assert_eq!(data, [0x5a; 4]);

        let spi = bus.release();
        assert_eq!(
            spi.transactions,
            vec![vec![Op::Write(vec![0x00, 0x39, 0x00]), Op::Read(4)]]
        );
    }

    #[test]
    fn test_write_single_transaction() {
        let mut bus = SpiBus::new(FakeSpi::default());
        bus.write(&[0x00, 0x01, 0x0c], &[192, 168, 1, 1]).unwrap();

        let spi = bus.release();
        assert_eq!(
            spi.transactions,
            vec![vec![
                Op::Write(vec![0x00, 0x01, 0x0c]),
                Op::Write(vec![192, 168, 1, 1])
            ]]
        );
    }

    #[test]
    fn test_error_mapping() {
        let mut bus = SpiBus::new(FakeSpi {
            fault: Some(ErrorKind::ChipSelectFault),
            ..Default::default()
        });
        assert_eq!(bus.write(&[0; 3], &[0]), Err(BusError::ChipSelect));

        let mut bus = SpiBus::new(FakeSpi {
            fault: Some(ErrorKind::Overrun),
            ..Default::default()
        });
        let mut data = [0u8; 1];
        assert_eq!(bus.read(&[0; 3], &mut data), Err(BusError::Transfer));
    }
}
