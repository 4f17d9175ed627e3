//! Register and buffer access
//!
//! Every call issues exactly one bus transaction in variable length mode. Bus faults are
//! returned unchanged.

use crate::core::SocketId;
use crate::driver::frame::{Address, Block, Header};
use crate::driver::{Bus, BusError};

pub struct Codec<B> {
    bus: B,
}

impl<B: Bus> Codec<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn release(self) -> B {
        self.bus
    }

    pub fn read(&mut self, address: Address, data: &mut [u8]) -> Result<(), BusError> {
        self.bus.read(&Header::read(address).encode(), data)
    }

    pub fn write(&mut self, address: Address, data: &[u8]) -> Result<(), BusError> {
        self.bus.write(&Header::write(address).encode(), data)
    }

    pub fn read_u8(&mut self, address: Address) -> Result<u8, BusError> {
        let mut data = [0u8; 1];
        self.read(address, &mut data)?;
        Ok(data[0])
    }

    pub fn write_u8(&mut self, address: Address, value: u8) -> Result<(), BusError> {
        self.write(address, &[value])
    }

    pub fn read_u16(&mut self, address: Address) -> Result<u16, BusError> {
        Ok(u16::from_be_bytes(self.read_array(address)?))
    }

    pub fn write_u16(&mut self, address: Address, value: u16) -> Result<(), BusError> {
        self.write(address, &value.to_be_bytes())
    }

    pub fn read_array<const N: usize>(&mut self, address: Address) -> Result<[u8; N], BusError> {
        let mut data = [0u8; N];
        self.read(address, &mut data)?;
        Ok(data)
    }

    /// Reads a register the controller updates non-atomically
    ///
    /// Repeats until two consecutive reads agree. A zero reading is accepted immediately.
    pub fn read_u16_settled(&mut self, address: Address) -> Result<u16, BusError> {
        loop {
            let first = self.read_u16(address)?;
            if first == 0 {
                return Ok(0);
            }
            if self.read_u16(address)? == first {
                return Ok(first);
            }
        }
    }

    pub fn socket_u8(&mut self, sn: SocketId, offset: u16) -> Result<u8, BusError> {
        self.read_u8(Address::socket(sn, offset))
    }

    pub fn set_socket_u8(&mut self, sn: SocketId, offset: u16, value: u8) -> Result<(), BusError> {
        self.write_u8(Address::socket(sn, offset), value)
    }

    pub fn socket_u16(&mut self, sn: SocketId, offset: u16) -> Result<u16, BusError> {
        self.read_u16(Address::socket(sn, offset))
    }

    pub fn set_socket_u16(
        &mut self,
        sn: SocketId,
        offset: u16,
        value: u16,
    ) -> Result<(), BusError> {
        self.write_u16(Address::socket(sn, offset), value)
    }

    pub fn common_u8(&mut self, offset: u16) -> Result<u8, BusError> {
        self.read_u8(Address::common(offset))
    }

    pub fn set_common_u8(&mut self, offset: u16, value: u8) -> Result<(), BusError> {
        self.write_u8(Address::common(offset), value)
    }

    pub fn buffer_read(
        &mut self,
        block: Block,
        offset: u16,
        data: &mut [u8],
    ) -> Result<(), BusError> {
        self.read(Address::new(block, offset), data)
    }

    pub fn buffer_write(&mut self, block: Block, offset: u16, data: &[u8]) -> Result<(), BusError> {
        self.write(Address::new(block, offset), data)
    }
}
