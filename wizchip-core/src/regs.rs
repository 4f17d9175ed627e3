//! Register map
//!
//! Offsets are relative to the block they are addressed in. Multi-byte registers are big-endian.

/// Common register block offsets
pub mod common {
    pub const MR: u16 = 0x0000;
    pub const GAR: u16 = 0x0001;
    pub const SUBR: u16 = 0x0005;
    pub const SHAR: u16 = 0x0009;
    pub const SIPR: u16 = 0x000f;
    pub const INTLEVEL: u16 = 0x0013;
    pub const IR: u16 = 0x0015;
    pub const IMR: u16 = 0x0016;
    pub const SIR: u16 = 0x0017;
    pub const SIMR: u16 = 0x0018;
    pub const RTR: u16 = 0x0019;
    pub const RCR: u16 = 0x001b;
    pub const PTIMER: u16 = 0x001c;
    pub const PMAGIC: u16 = 0x001d;
    pub const PHAR: u16 = 0x001e;
    pub const PSID: u16 = 0x0024;
    pub const PMRU: u16 = 0x0026;
    pub const UIPR: u16 = 0x0028;
    pub const UPORTR: u16 = 0x002c;
    pub const PHYCFGR: u16 = 0x002e;
    pub const VERSIONR: u16 = 0x0039;

    /// Expected `VERSIONR` value
    pub const VERSION: u8 = 0x04;
}

/// Common mode register bits
pub mod mode {
    pub const RST: u8 = 0x80;
    pub const WOL: u8 = 0x20;
    pub const PB: u8 = 0x10;
    pub const PPPOE: u8 = 0x08;
    pub const FARP: u8 = 0x02;
}

/// PHY configuration register bits
pub mod phy {
    /// Active low
    pub const RST: u8 = 0x80;
    /// Take operation mode from `OPMDC` instead of the hardware pins
    pub const OPMD: u8 = 0x40;
    pub const OPMDC_MASK: u8 = 0x38;
    pub const OPMDC_SHIFT: u8 = 3;
    pub const DPX: u8 = 0x04;
    pub const SPD: u8 = 0x02;
    pub const LNK: u8 = 0x01;
}

/// Socket register block offsets
pub mod socket {
    pub const MR: u16 = 0x0000;
    pub const CR: u16 = 0x0001;
    pub const IR: u16 = 0x0002;
    pub const SR: u16 = 0x0003;
    pub const PORT: u16 = 0x0004;
    pub const DHAR: u16 = 0x0006;
    pub const DIPR: u16 = 0x000c;
    pub const DPORT: u16 = 0x0010;
    pub const MSSR: u16 = 0x0012;
    pub const TOS: u16 = 0x0015;
    pub const TTL: u16 = 0x0016;
    pub const RXBUF_SIZE: u16 = 0x001e;
    pub const TXBUF_SIZE: u16 = 0x001f;
    pub const TX_FSR: u16 = 0x0020;
    pub const TX_RD: u16 = 0x0022;
    pub const TX_WR: u16 = 0x0024;
    pub const RX_RSR: u16 = 0x0026;
    pub const RX_RD: u16 = 0x0028;
    pub const RX_WR: u16 = 0x002a;
    pub const IMR: u16 = 0x002c;
    pub const FRAG: u16 = 0x002d;
    pub const KPALVTR: u16 = 0x002f;
}

/// Socket mode register bits above the protocol nibble
pub mod socket_mode {
    pub const PROTOCOL_MASK: u8 = 0x0f;
    pub const MULTI: u8 = 0x80;
    pub const BCASTB: u8 = 0x40;
    pub const ND: u8 = 0x20;
    pub const UCASTB: u8 = 0x10;
}

/// Sizes of the receive headers the controller prepends to buffered packets
pub mod header {
    /// UDP: peer address, peer port, payload length
    pub const UDP: usize = 8;
    /// MACRAW: frame length, counting the header itself
    pub const MACRAW: usize = 2;
}

/// Largest Ethernet frame accepted in MACRAW mode
pub const MAX_FRAME_LEN: usize = 1514;
