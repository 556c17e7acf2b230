use pnet::util::MacAddr;
use pnet_packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::{self, MutableIpv4Packet};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
const DEFAULT_TTL: u8 = 64;
const DEFAULT_IDENTIFICATION: u16 = 1;

/// Addresses and ports of a synthesized frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Endpoints {
    /// The other side of the conversation. MAC addresses are kept: they are rewritten
    /// downstream by the metadata and field-update stages.
    pub fn reversed(&self) -> Self {
        Endpoints {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            ..*self
        }
    }
}

/// A complete Ethernet/IPv4/L4 frame handed to generation stages as a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketTemplate(Vec<u8>);

impl PacketTemplate {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Swap the IPv4 addresses and L4 ports in place of a copy.
    ///
    /// Checksums are left untouched: one's complement sums do not depend on the order of the
    /// swapped words. Returns `None` if the frame is too short to hold the headers.
    pub fn reversed(&self) -> Option<Self> {
        let mut bytes = self.0.clone();
        let ihl = {
            let mut ip = MutableIpv4Packet::new(bytes.get_mut(ETHERNET_HEADER_LEN..)?)?;
            let (src, dst) = (ip.get_source(), ip.get_destination());
            ip.set_source(dst);
            ip.set_destination(src);
            usize::from(ip.get_header_length()) * 4
        };
        let l4 = bytes.get_mut(ETHERNET_HEADER_LEN + ihl..ETHERNET_HEADER_LEN + ihl + 4)?;
        let (src_port, dst_port) = l4.split_at_mut(2);
        src_port.swap_with_slice(dst_port);
        Some(PacketTemplate(bytes))
    }
}

impl From<Vec<u8>> for PacketTemplate {
    fn from(bytes: Vec<u8>) -> Self {
        PacketTemplate(bytes)
    }
}

/// Configures the Ethernet frame by setting the source, destination MAC addresses,
/// and setting the EtherType to IPv4.
pub(crate) fn setup_ethernet_frame(packet: &mut [u8], endpoints: &Endpoints) -> Option<()> {
    let mut eth_packet = MutableEthernetPacket::new(packet)?;
    eth_packet.set_ethertype(EtherTypes::Ipv4);
    eth_packet.set_source(endpoints.src_mac);
    eth_packet.set_destination(endpoints.dst_mac);

    Some(())
}

/// Sets up the IPv4 header of the frame, then computes the header checksum.
/// `packet` must span the IPv4 header and everything after it.
pub(crate) fn setup_ip_packet(
    packet: &mut [u8],
    endpoints: &Endpoints,
    protocol: IpNextHeaderProtocol,
) -> Option<()> {
    let len = u16::try_from(packet.len()).ok()?;
    let mut ipv4_packet = MutableIpv4Packet::new(packet)?;

    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length((IPV4_HEADER_LEN / 4) as u8);
    ipv4_packet.set_total_length(len);
    ipv4_packet.set_identification(DEFAULT_IDENTIFICATION);
    ipv4_packet.set_ttl(DEFAULT_TTL);
    ipv4_packet.set_next_level_protocol(protocol);
    ipv4_packet.set_source(endpoints.src_ip);
    ipv4_packet.set_destination(endpoints.dst_ip);

    ipv4_packet.set_checksum(ipv4::checksum(&ipv4_packet.to_immutable()));

    Some(())
}
