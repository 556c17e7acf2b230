//! Conversions between textual addresses and the integer encodings expected by field-setting
//! stages. All integers are big-endian: the first octet of the text is the most significant.

use crate::error::{AddressKind, Error, Result};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr> {
    text.trim().parse().map_err(|_| Error::Format {
        kind: AddressKind::Ipv4,
        value: text.to_string(),
    })
}

pub fn parse_mac(text: &str) -> Result<MacAddr> {
    text.trim().parse().map_err(|_| Error::Format {
        kind: AddressKind::Mac,
        value: text.to_string(),
    })
}

/// Dotted quad to its 32-bit network-order value
pub fn ip_to_int(text: &str) -> Result<u32> {
    parse_ipv4(text).map(u32::from)
}

pub fn int_to_ip(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

/// Colon-separated MAC to a 48-bit value, most significant octet first
pub fn mac_to_int(text: &str) -> Result<u64> {
    parse_mac(text).map(mac_bits)
}

pub fn mac_bits(mac: MacAddr) -> u64 {
    let MacAddr(a, b, c, d, e, f) = mac;
    [a, b, c, d, e, f]
        .into_iter()
        .fold(0, |acc, octet| (acc << 8) | u64::from(octet))
}
