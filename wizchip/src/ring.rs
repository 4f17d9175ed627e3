//! Socket buffer rings
//!
//! Each socket owns a fixed region of the controller's TX and RX memories. The controller
//! exposes free-running 16-bit read and write pointers; the byte offset within the region is
//! the pointer modulo the region capacity. A transfer crossing the region end is split in two.

use core::ops::Range;

use crate::codec::Codec;
use crate::config::BufferTable;
use crate::core::{BufferSize, SOCKET_COUNT};
use crate::driver::frame::Block;
use crate::driver::{Bus, BusError};

/// Contiguous piece of a ring transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    pub offset: u16,
    pub len: usize,
}

/// Location and size of a socket buffer within the controller memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingBuffer {
    base: u16,
    capacity: u16,
}

impl RingBuffer {
    pub const fn new(base: u16, size: BufferSize) -> Self {
        Self {
            base,
            capacity: size.bytes(),
        }
    }

    /// Region start within the 16 KB memory
    pub const fn base(&self) -> usize {
        self.base as usize
    }

    pub const fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Region bounds within the 16 KB memory
    pub const fn range(&self) -> Range<usize> {
        self.base()..self.base() + self.capacity()
    }

    /// Byte offset addressed by `pointer`
    pub const fn offset(&self, pointer: u16) -> u16 {
        pointer & (self.capacity - 1)
    }

    /// Splits a transfer of `len` bytes starting at `pointer` at the region end.
    pub fn spans(&self, pointer: u16, len: usize) -> (Span, Option<Span>) {
        assert!(len <= self.capacity());
        let offset = self.offset(pointer);
        let until_end = self.capacity() - usize::from(offset);
        if len <= until_end {
            (Span { offset, len }, None)
        } else {
            (
                Span {
                    offset,
                    len: until_end,
                },
                Some(Span {
                    offset: 0,
                    len: len - until_end,
                }),
            )
        }
    }

    /// Writes `data` at `pointer` and returns the advanced pointer.
    pub fn write<B: Bus>(
        &self,
        codec: &mut Codec<B>,
        block: Block,
        pointer: u16,
        data: &[u8],
    ) -> Result<u16, BusError> {
        let (head, tail) = self.spans(pointer, data.len());
        let (first, second) = data.split_at(head.len);
        codec.buffer_write(block, head.offset, first)?;
        if let Some(tail) = tail {
            codec.buffer_write(block, tail.offset, second)?;
        }
        Ok(advance(pointer, data.len()))
    }

    /// Fills `data` from `pointer` and returns the advanced pointer.
    pub fn read<B: Bus>(
        &self,
        codec: &mut Codec<B>,
        block: Block,
        pointer: u16,
        data: &mut [u8],
    ) -> Result<u16, BusError> {
        let len = data.len();
        let (head, tail) = self.spans(pointer, len);
        let (first, second) = data.split_at_mut(head.len);
        codec.buffer_read(block, head.offset, first)?;
        if let Some(tail) = tail {
            codec.buffer_read(block, tail.offset, second)?;
        }
        Ok(advance(pointer, len))
    }
}

/// Pointers count modulo 2^16, as the controller does.
pub const fn advance(pointer: u16, len: usize) -> u16 {
    pointer.wrapping_add(len as u16)
}

/// Lays regions out back to back in socket order.
pub fn partition(table: &BufferTable) -> [RingBuffer; SOCKET_COUNT] {
    let mut base = 0u16;
    core::array::from_fn(|index| {
        let ring = RingBuffer::new(base, table[index]);
        base = base.wrapping_add(table[index].bytes());
        ring
    })
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::core::SocketId;
    use std::vec::Vec;

    /// Memory of one socket region, recording each transfer
    struct Region {
        memory: Vec<u8>,
        transfers: Vec<Span>,
    }

    impl Region {
        fn new(capacity: usize) -> Self {
            Self {
                memory: std::vec![0; capacity],
                transfers: Vec::new(),
            }
        }
    }

    impl Bus for Region {
        fn read(&mut self, header: &[u8; 3], data: &mut [u8]) -> Result<(), BusError> {
            let offset = usize::from(u16::from_be_bytes([header[0], header[1]]));
            let end = offset + data.len();
            if end > self.memory.len() {
                return Err(BusError::Transfer);
            }
            self.transfers.push(Span {
                offset: offset as u16,
                len: data.len(),
            });
            data.copy_from_slice(&self.memory[offset..end]);
            Ok(())
        }

        fn write(&mut self, header: &[u8; 3], data: &[u8]) -> Result<(), BusError> {
            let offset = usize::from(u16::from_be_bytes([header[0], header[1]]));
            let end = offset + data.len();
            if end > self.memory.len() {
                return Err(BusError::Transfer);
            }
            self.transfers.push(Span {
                offset: offset as u16,
                len: data.len(),
            });
            self.memory[offset..end].copy_from_slice(data);
            Ok(())
        }
    }

    fn tx_block() -> Block {
        Block::Tx(SocketId::new(0).unwrap())
    }

    #[test]
    fn test_spans_at_boundary() {
        let ring = RingBuffer::new(0, BufferSize::Kb2);
        assert_eq!(ring.spans(0, 2048), (Span { offset: 0, len: 2048 }, None));
        assert_eq!(ring.spans(2047, 1), (Span { offset: 2047, len: 1 }, None));
        assert_eq!(
            ring.spans(2047, 2),
            (Span { offset: 2047, len: 1 }, Some(Span { offset: 0, len: 1 }))
        );
        assert_eq!(ring.spans(0xfffe, 4).0, Span { offset: 2046, len: 2 });
        assert_eq!(ring.spans(2048 * 3, 10), (Span { offset: 0, len: 10 }, None));
    }

    #[test]
    fn test_split_write_matches_unwrapped() {
        let ring = RingBuffer::new(0, BufferSize::Kb1);
        let payload: Vec<u8> = (0..700u16).map(|i| (i % 251) as u8).collect();

        for start in [0u16, 1, 323, 324, 325, 1023, 1024, 0xfc00 - 1, 0xffff] {
            let mut codec = Codec::new(Region::new(1024));
            let pointer = ring.write(&mut codec, tx_block(), start, &payload).unwrap();
            assert_eq!(pointer, start.wrapping_add(700));

            let region = codec.release();
            let unwrapped: Vec<u8> = (0..payload.len())
                .map(|i| region.memory[(usize::from(start) + i) % 1024])
                .collect();
            assert_eq!(unwrapped, payload);
            let crosses = usize::from(ring.offset(start)) + payload.len() > 1024;
            assert_eq!(region.transfers.len(), if crosses { 2 } else { 1 });
        }
    }

    #[test]
    fn test_split_read_round_trip() {
        let ring = RingBuffer::new(0, BufferSize::Kb1);
        let payload: Vec<u8> = (0..1024u16).map(|i| (i * 7) as u8).collect();
        let mut codec = Codec::new(Region::new(1024));
        ring.write(&mut codec, tx_block(), 600, &payload).unwrap();

        let mut read_back = std::vec![0u8; 1024];
        let pointer = ring.read(&mut codec, tx_block(), 600, &mut read_back).unwrap();
        assert_eq!(pointer, 1624);
        assert_eq!(read_back, payload);
    }

    #[test]
    fn test_partition() {
        let mut table = [BufferSize::Kb1; SOCKET_COUNT];
        table[0] = BufferSize::Kb4;
        table[1] = BufferSize::Kb2;
        let rings = partition(&table);
        assert_eq!(rings[0].range(), 0..4096);
        assert_eq!(rings[1].range(), 4096..6144);
        assert_eq!(rings[2].range(), 6144..7168);
        assert_eq!(rings[7].range(), 11264..12288);
    }
}
