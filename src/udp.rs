use crate::packet::*;

use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::udp::{self, MutableUdpPacket};

pub const UDP_HEADER_LEN: usize = 8;

/// Configures the UDP header, copies the payload, then computes the checksum
fn setup_udp_packet(packet: &mut [u8], endpoints: &Endpoints, payload: &[u8]) -> Option<()> {
    let length = u16::try_from(packet.len()).ok()?;
    let mut udp_packet = MutableUdpPacket::new(packet)?;
    udp_packet.set_source(endpoints.src_port);
    udp_packet.set_destination(endpoints.dst_port);
    udp_packet.set_length(length);
    udp_packet.set_payload(payload);
    udp_packet.set_checksum(udp::ipv4_checksum(
        &udp_packet.to_immutable(),
        &endpoints.src_ip,
        &endpoints.dst_ip,
    ));

    Some(())
}

/// Build an Ethernet/IPv4/UDP frame carrying `payload`
pub fn build_udp_template(endpoints: &Endpoints, payload: &[u8]) -> Option<PacketTemplate> {
    let mut packet = vec![0u8; ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len()];
    setup_ethernet_frame(&mut packet, endpoints)?;
    setup_ip_packet(
        &mut packet[ETHERNET_HEADER_LEN..],
        endpoints,
        IpNextHeaderProtocols::Udp,
    )?;
    setup_udp_packet(
        &mut packet[ETHERNET_HEADER_LEN + IPV4_HEADER_LEN..],
        endpoints,
        payload,
    )?;
    Some(packet.into())
}

/// Text payload filling a frame up to `frame_size` bytes. Frames smaller than the headers
/// carry no payload.
pub fn filler_payload(frame_size: usize) -> Vec<u8> {
    let room = frame_size.saturating_sub(ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN);
    b"hello"
        .iter()
        .chain(b"0123456789".iter().cycle().take(2000))
        .take(room)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::util::MacAddr;
    use pnet_packet::ethernet::EthernetPacket;
    use pnet_packet::ipv4::Ipv4Packet;
    use pnet_packet::udp::UdpPacket;
    use pnet_packet::Packet;
    use std::net::Ipv4Addr;

    fn endpoints() -> Endpoints {
        Endpoints {
            src_mac: MacAddr::new(2, 0, 0, 0, 0, 1),
            dst_mac: MacAddr::new(2, 0, 0, 0, 0, 2),
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(10, 1, 0, 1),
            src_port: 1000,
            dst_port: 80,
        }
    }

    #[test]
    fn test_filler_payload() {
        assert_eq!(filler_payload(60), b"hello0123456789012".to_vec());
        assert!(filler_payload(42).is_empty());
        assert!(filler_payload(10).is_empty());
        assert_eq!(filler_payload(1500).len(), 1458);
    }

    #[test]
    fn test_udp_template() {
        let template = build_udp_template(&endpoints(), &filler_payload(60)).unwrap();
        assert_eq!(template.len(), 60);

        let eth = EthernetPacket::new(template.as_bytes()).unwrap();
        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_source(), Ipv4Addr::new(10, 0, 0, 1));
        let udp_packet = UdpPacket::new(ip.payload()).unwrap();
        assert_eq!(udp_packet.get_length(), 26);
        assert_eq!(udp_packet.get_destination(), 80);
        assert_eq!(
            udp_packet.get_checksum(),
            udp::ipv4_checksum(&udp_packet, &ip.get_source(), &ip.get_destination())
        );
    }

    #[test]
    fn test_reversed_template() {
        let payload = filler_payload(128);
        let forward = build_udp_template(&endpoints(), &payload).unwrap();
        let reverse = build_udp_template(&endpoints().reversed(), &payload).unwrap();

        assert_ne!(forward, reverse);
        assert_eq!(forward.reversed().unwrap(), reverse);
        assert_eq!(reverse.reversed().unwrap(), forward);
        assert_eq!(forward.reversed().unwrap().reversed().unwrap(), forward);
        assert!(PacketTemplate::from(vec![0u8; 20]).reversed().is_none());
    }
}
