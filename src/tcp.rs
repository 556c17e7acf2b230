use crate::packet::*;

use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::tcp::{self, MutableTcpPacket, TcpFlags};

pub const TCP_HEADER_LEN: usize = 20;
const DEFAULT_WINDOW: u16 = 8192;

/// Parameters of the TCP header written in a template
#[derive(Debug, Clone, Copy)]
pub struct TcpTemplateInfo {
    pub sequence: u32,
    pub flags: u8,
}

impl Default for TcpTemplateInfo {
    fn default() -> Self {
        TcpTemplateInfo {
            sequence: 0,
            flags: TcpFlags::SYN,
        }
    }
}

/// Configures the TCP header, copies the payload, then computes the checksum
fn setup_tcp_packet(
    packet: &mut [u8],
    endpoints: &Endpoints,
    info: &TcpTemplateInfo,
    payload: &[u8],
) -> Option<()> {
    let mut tcp_packet = MutableTcpPacket::new(packet)?;
    tcp_packet.set_source(endpoints.src_port);
    tcp_packet.set_destination(endpoints.dst_port);
    tcp_packet.set_sequence(info.sequence);
    tcp_packet.set_acknowledgement(0);
    // the payload offset depends on the data offset
    tcp_packet.set_data_offset((TCP_HEADER_LEN / 4) as u8);
    tcp_packet.set_flags(info.flags);
    tcp_packet.set_window(DEFAULT_WINDOW);
    tcp_packet.set_payload(payload);
    tcp_packet.set_checksum(tcp::ipv4_checksum(
        &tcp_packet.to_immutable(),
        &endpoints.src_ip,
        &endpoints.dst_ip,
    ));

    Some(())
}

/// Build an Ethernet/IPv4/TCP frame carrying `payload`
pub fn build_tcp_template(
    endpoints: &Endpoints,
    info: &TcpTemplateInfo,
    payload: &[u8],
) -> Option<PacketTemplate> {
    let mut packet = vec![0u8; ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN + payload.len()];
    setup_ethernet_frame(&mut packet, endpoints)?;
    setup_ip_packet(
        &mut packet[ETHERNET_HEADER_LEN..],
        endpoints,
        IpNextHeaderProtocols::Tcp,
    )?;
    setup_tcp_packet(
        &mut packet[ETHERNET_HEADER_LEN + IPV4_HEADER_LEN..],
        endpoints,
        info,
        payload,
    )?;
    Some(packet.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::util::MacAddr;
    use pnet_packet::ethernet::EthernetPacket;
    use pnet_packet::ipv4::{self, Ipv4Packet};
    use pnet_packet::tcp::TcpPacket;
    use pnet_packet::Packet;
    use std::net::Ipv4Addr;

    fn endpoints() -> Endpoints {
        Endpoints {
            src_mac: MacAddr::new(2, 0, 0, 0, 0, 1),
            dst_mac: MacAddr::new(2, 0, 0, 0, 0, 2),
            src_ip: Ipv4Addr::new(192, 168, 0, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 1001,
            dst_port: 12345,
        }
    }

    #[test]
    fn test_tcp_template() {
        let info = TcpTemplateInfo {
            sequence: 12345,
            ..Default::default()
        };
        let template = build_tcp_template(&endpoints(), &info, b"meow").unwrap();
        assert_eq!(template.len(), 58);

        let eth = EthernetPacket::new(template.as_bytes()).unwrap();
        assert_eq!(eth.get_source(), MacAddr::new(2, 0, 0, 0, 0, 1));
        assert_eq!(eth.get_destination(), MacAddr::new(2, 0, 0, 0, 0, 2));

        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_total_length(), 44);
        assert_eq!(ip.get_ttl(), 64);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let tcp_packet = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(tcp_packet.get_source(), 1001);
        assert_eq!(tcp_packet.get_destination(), 12345);
        assert_eq!(tcp_packet.get_sequence(), 12345);
        assert_eq!(tcp_packet.get_flags(), TcpFlags::SYN);
        assert_eq!(tcp_packet.payload(), b"meow");
        assert_eq!(
            tcp_packet.get_checksum(),
            tcp::ipv4_checksum(&tcp_packet, &ip.get_source(), &ip.get_destination())
        );
    }
}
