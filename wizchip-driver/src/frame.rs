//! SPI frame control phase
//!
//! Every transaction starts with a 3-byte header: a 16-bit big-endian offset followed by a
//! control byte `[block select (5 bits) | read/write (1 bit) | operation mode (2 bits)]`.
//! The data phase follows while chip select stays asserted.

use wizchip_core::SocketId;

/// Memory region addressed by a transaction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Block {
    Common,
    Socket(SocketId),
    Tx(SocketId),
    Rx(SocketId),
}

impl Block {
    /// Block select bits
    pub const fn bsb(self) -> u8 {
        match self {
            Block::Common => 0,
            Block::Socket(sn) => 1 + 4 * sn.into_u8(),
            Block::Tx(sn) => 2 + 4 * sn.into_u8(),
            Block::Rx(sn) => 3 + 4 * sn.into_u8(),
        }
    }

    /// Decodes block select bits. Reserved selectors return `None`.
    pub const fn from_bsb(bsb: u8) -> Option<Self> {
        if bsb == 0 {
            return Some(Block::Common);
        }
        let Some(sn) = SocketId::new(bsb >> 2) else {
            return None;
        };
        match bsb & 0x3 {
            1 => Some(Block::Socket(sn)),
            2 => Some(Block::Tx(sn)),
            3 => Some(Block::Rx(sn)),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Read,
    Write,
}

/// Data phase length mode
///
/// The driver always uses variable length mode, where chip select delimits the transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpMode {
    #[default]
    Variable,
    Fixed1,
    Fixed2,
    Fixed4,
}

impl OpMode {
    pub const fn into_bits(self) -> u8 {
        match self {
            OpMode::Variable => 0b00,
            OpMode::Fixed1 => 0b01,
            OpMode::Fixed2 => 0b10,
            OpMode::Fixed4 => 0b11,
        }
    }

    pub const fn from_bits_truncating(bits: u8) -> Self {
        match bits & 0x3 {
            0b00 => OpMode::Variable,
            0b01 => OpMode::Fixed1,
            0b10 => OpMode::Fixed2,
            _ => OpMode::Fixed4,
        }
    }

    /// Data phase length for fixed modes
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            OpMode::Variable => None,
            OpMode::Fixed1 => Some(1),
            OpMode::Fixed2 => Some(2),
            OpMode::Fixed4 => Some(4),
        }
    }
}

/// Logical address of a register or buffer byte
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub offset: u16,
    pub block: Block,
}

impl Address {
    pub const fn new(block: Block, offset: u16) -> Self {
        Self { offset, block }
    }

    pub const fn common(offset: u16) -> Self {
        Self::new(Block::Common, offset)
    }

    pub const fn socket(sn: SocketId, offset: u16) -> Self {
        Self::new(Block::Socket(sn), offset)
    }

    pub const fn wrapping_add(self, delta: u16) -> Self {
        Self::new(self.block, self.offset.wrapping_add(delta))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidHeader;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub address: Address,
    pub direction: Direction,
    pub op_mode: OpMode,
}

impl Header {
    pub const LENGTH: usize = 3;

    const BSB_SHIFT: u8 = 3;
    const RWB_BIT: u8 = 2;

    pub const fn read(address: Address) -> Self {
        Self {
            address,
            direction: Direction::Read,
            op_mode: OpMode::Variable,
        }
    }

    pub const fn write(address: Address) -> Self {
        Self {
            address,
            direction: Direction::Write,
            op_mode: OpMode::Variable,
        }
    }

    pub const fn control(&self) -> u8 {
        let rwb = match self.direction {
            Direction::Read => 0,
            Direction::Write => 1,
        };
        self.address.block.bsb() << Self::BSB_SHIFT
            | rwb << Self::RWB_BIT
            | self.op_mode.into_bits()
    }

    pub const fn encode(&self) -> [u8; Self::LENGTH] {
        let [hi, lo] = self.address.offset.to_be_bytes();
        [hi, lo, self.control()]
    }

    pub const fn decode(bytes: &[u8; Self::LENGTH]) -> Result<Self, InvalidHeader> {
        let control = bytes[2];
        let Some(block) = Block::from_bsb(control >> Self::BSB_SHIFT) else {
            return Err(InvalidHeader);
        };
        let direction = if (control >> Self::RWB_BIT) & 0x1 != 0 {
            Direction::Write
        } else {
            Direction::Read
        };
        Ok(Self {
            address: Address::new(block, u16::from_be_bytes([bytes[0], bytes[1]])),
            direction,
            op_mode: OpMode::from_bits_truncating(control),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sn(value: u8) -> SocketId {
        SocketId::new(value).unwrap()
    }

    #[test]
    fn test_block_select() {
        assert_eq!(Block::Common.bsb(), 0);
        assert_eq!(Block::Socket(sn(0)).bsb(), 0b00001);
        assert_eq!(Block::Tx(sn(0)).bsb(), 0b00010);
        assert_eq!(Block::Rx(sn(0)).bsb(), 0b00011);
        assert_eq!(Block::Socket(sn(7)).bsb(), 0b11101);
        assert_eq!(Block::Rx(sn(7)).bsb(), 0b11111);
        // Selectors 4, 8, ... are reserved
        assert_eq!(Block::from_bsb(0b00100), None);
        for value in 0..8 {
            let block = Block::Tx(sn(value));
            assert_eq!(Block::from_bsb(block.bsb()), Some(block));
        }
    }

    #[test]
    fn test_header_layout() {
        let header = Header::write(Address::socket(sn(1), 0x0001));
        assert_eq!(header.encode(), [0x00, 0x01, 0x2c]);

        let header = Header::read(Address::common(0x0039));
        assert_eq!(header.encode(), [0x00, 0x39, 0x00]);

        let header = Header::read(Address::new(Block::Rx(sn(3)), 0x07ff));
        assert_eq!(header.encode(), [0x07, 0xff, 0x78]);
        assert_eq!(Header::decode(&header.encode()), Ok(header));
    }

    #[test]
    fn test_decode_reserved_block() {
        assert_eq!(Header::decode(&[0x00, 0x00, 0x20]), Err(InvalidHeader));
    }
}
