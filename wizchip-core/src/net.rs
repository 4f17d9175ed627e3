use core::fmt;
use core::net::Ipv4Addr;

/// Ethernet hardware address
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Address assignment policy
///
/// The controller has no notion of it; the value is carried for the application's DHCP client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetMode {
    #[default]
    Static,
    Dhcp,
}

/// Network identity of the controller
///
/// `mac`, `ip`, `subnet` and `gateway` live in controller registers. `dns` and `mode` are
/// host-side state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NetInfo {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub mode: NetMode,
}

impl Default for NetInfo {
    fn default() -> Self {
        let ip = Ipv4Addr::new(169, 254, 116, 50);
        Self {
            mac: MacAddress([0xc0, 0xe0, 0x07, 0x11, 0x11, 0x11]),
            ip,
            subnet: Ipv4Addr::new(255, 255, 0, 0),
            gateway: ip,
            dns: ip,
            mode: NetMode::Static,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetInfo {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "NetInfo {{ mac: {}, ip: {}, subnet: {}, gateway: {}, dns: {}, mode: {} }}",
            self.mac.0,
            self.ip.octets(),
            self.subnet.octets(),
            self.gateway.octets(),
            self.dns.octets(),
            self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_mac_display() {
        let mac = MacAddress([0x00, 0x08, 0xdc, 0x0a, 0xb1, 0xff]);
        assert_eq!(mac.to_string(), "00:08:DC:0A:B1:FF");
    }

    #[test]
    fn test_default_identity() {
        let info = NetInfo::default();
        assert_eq!(info.ip, Ipv4Addr::new(169, 254, 116, 50));
        assert_eq!(info.gateway, info.ip);
        assert_eq!(info.dns, info.ip);
        assert_eq!(info.mode, NetMode::Static);
    }
}
