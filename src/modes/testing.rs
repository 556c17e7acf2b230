//! Bidirectional VXLAN tunnel testing.
//!
//! The transmit pipeline simulates two endpoints: each direction generates UDP flows, tags them
//! with its tunnel metadata, spreads them over its candidate next-hop MACs and joins a shared
//! encapsulation chain. The receive pipeline decapsulates, demultiplexes on the tunnel id and
//! answers matched traffic with ARP announcements re-tunneled to the output port.

use crate::error::{Error, Result};
use crate::packet::{Endpoints, PacketTemplate, ETHERNET_HEADER_LEN, IPV4_HEADER_LEN};
use crate::pipeline::{Gate, Pipeline, PipelineGraph, PipelineKind, StageId};
use crate::producers::{Producers, SelectionUnit};
use crate::stage::args::{
    ArpBlastArgs, ExactMatchArgs, FlowGenArgs, HashLbArgs, HashMode, NoArgs, PortOutArgs,
    SetMetadataArgs, UpdateArgs,
};
use crate::stage::StageFactory;
use crate::structs::{Arrival, Direction, DurationDistribution, TestingSpec, TrafficSpec};
use crate::udp::{build_udp_template, filler_payload, UDP_HEADER_LEN};

use pnet::util::MacAddr;

const TEMPLATE_SRC_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
const TEMPLATE_DST_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x02);

/// Name of the generation stage of `direction`
pub fn flowgen_name(direction: Direction, core: u32) -> String {
    format!("flowgen_{}_c{core}", direction.tag())
}

/// UDP template of `direction`: the reverse one swaps addresses and ports of the forward one
pub fn template(spec: &TestingSpec, direction: Direction) -> Result<PacketTemplate> {
    let headers = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN;
    if usize::from(spec.pkt_size) < headers {
        return Err(Error::Configuration {
            field: "pkt_size",
            reason: format!(
                "{} bytes cannot hold the {headers} byte Ethernet, IPv4 and UDP headers",
                spec.pkt_size
            ),
        });
    }
    let forward = Endpoints {
        src_mac: TEMPLATE_SRC_MAC,
        dst_mac: TEMPLATE_DST_MAC,
        src_ip: spec.src_ips.min,
        dst_ip: spec.dst_ips.min,
        src_port: spec.src_ports.min,
        dst_port: spec.dst_ports.min,
    };
    let endpoints = match direction {
        Direction::Forward => forward,
        Direction::Reverse => forward.reversed(),
    };
    build_udp_template(&endpoints, &filler_payload(usize::from(spec.pkt_size))).ok_or_else(|| {
        Error::Configuration {
            field: "pkt_size",
            reason: format!("cannot build a {} byte UDP template", spec.pkt_size),
        }
    })
}

/// Generation parameters of `direction`. The packet budget is split evenly between the
/// directions; reverse ranges are the forward ones swapped.
pub fn flowgen_args(spec: &TestingSpec, direction: Direction) -> Result<FlowGenArgs> {
    let pps = spec.flow_rate * spec.pps_per_flow * spec.flow_duration;
    if !pps.is_finite() {
        return Err(Error::Configuration {
            field: "pps_per_flow",
            reason: format!(
                "{} flows/s * {} pps * {} s is not a finite packet rate",
                spec.flow_rate, spec.pps_per_flow, spec.flow_duration
            ),
        });
    }
    let (ip_src, ip_dst, port_src, port_dst) = (
        spec.src_ips.size(),
        spec.dst_ips.size(),
        spec.src_ports.size(),
        spec.dst_ports.size(),
    );
    let (ip_src_range, ip_dst_range, port_src_range, port_dst_range) = match direction {
        Direction::Forward => (ip_src, ip_dst, port_src, port_dst),
        Direction::Reverse => (ip_dst, ip_src, port_dst, port_src),
    };
    Ok(FlowGenArgs {
        template: template(spec, direction)?,
        pps: pps / 2.0,
        flow_rate: spec.flow_rate / 2.0,
        flow_duration: spec.flow_duration,
        arrival: Arrival::Uniform,
        duration: DurationDistribution::Uniform,
        quick_rampup: spec.quick_rampup,
        ip_src_range: Some(ip_src_range),
        ip_dst_range: Some(ip_dst_range),
        port_src_range: Some(port_src_range),
        port_dst_range: Some(port_dst_range),
    })
}

fn tunnel_metadata(traffic: &TrafficSpec, spec: &TestingSpec, direction: Direction) -> SetMetadataArgs {
    SetMetadataArgs::tunnel(
        spec.tun_src_ip,
        spec.tun_dst_ip,
        spec.tunnel_id(direction),
        traffic.src_mac,
        spec.primary_dst_mac(direction),
    )
}

/// VXLAN, IP then Ethernet encapsulation. Returns the entry and exit stages.
fn encap_chain(pipeline: &mut Pipeline, factory: &dyn StageFactory) -> Result<(StageId, StageId)> {
    let vxencap = pipeline.instantiate(factory, "VXLANEncap", None, &NoArgs {})?;
    let ipencap = pipeline.instantiate(factory, "IPEncap", None, &NoArgs {})?;
    let ethencap = pipeline.instantiate(factory, "EtherEncap", None, &NoArgs {})?;
    pipeline.add_edge(vxencap, 0, ipencap, 0)?;
    pipeline.add_edge(ipencap, 0, ethencap, 0)?;
    Ok((vxencap, ethencap))
}

/// Generation, checksum, metadata tag and MAC load balancing of one direction, merged into
/// `vxencap`. Returns the generation stage.
fn setup_direction(
    pipeline: &mut Pipeline,
    traffic: &TrafficSpec,
    spec: &TestingSpec,
    direction: Direction,
    factory: &dyn StageFactory,
    vxencap: StageId,
) -> Result<StageId> {
    let tag = direction.tag();
    let src = pipeline.instantiate(
        factory,
        "FlowGen",
        Some(flowgen_name(direction, spec.core)),
        &flowgen_args(spec, direction)?,
    )?;
    let cksum = pipeline.instantiate(
        factory,
        "IPChecksum",
        Some(format!("cksum_{tag}")),
        &NoArgs {},
    )?;
    let setmd = pipeline.instantiate(
        factory,
        "SetMetadata",
        Some(format!("setmd_{tag}")),
        &tunnel_metadata(traffic, spec, direction),
    )?;
    pipeline.add_edge(src, 0, cksum, 0)?;
    pipeline.add_edge(cksum, 0, setmd, 0)?;

    let macs = spec.dst_macs(direction);
    let gates = (0..macs.len())
        .map(|i| {
            Gate::try_from(i).map_err(|_| Error::Configuration {
                field: "dst_macs",
                reason: format!("{} next hops exceed the gate index space", macs.len()),
            })
        })
        .collect::<Result<Vec<Gate>>>()?;
    let lb = pipeline.instantiate(
        factory,
        "HashLB",
        Some(format!("lb_{tag}")),
        &HashLbArgs {
            mode: HashMode::L4,
            gates: gates.clone(),
        },
    )?;
    pipeline.add_edge(setmd, 0, lb, 0)?;
    for (gate, mac) in gates.into_iter().zip(macs) {
        let update = pipeline.instantiate(
            factory,
            "Update",
            Some(format!("update_{tag}{gate}")),
            &UpdateArgs::ether_dst(*mac),
        )?;
        pipeline.add_edge(lb, gate, update, 0)?;
        pipeline.add_edge(update, 0, vxencap, 0)?;
    }
    Ok(src)
}

/// Forward and reverse traffic generation sharing one encapsulation chain
pub fn setup_tx_pipeline(
    traffic: &TrafficSpec,
    spec: &TestingSpec,
    factory: &dyn StageFactory,
) -> Result<PipelineGraph> {
    let mut pipeline = Pipeline::new(PipelineKind::Tx);
    let (vxencap, ethencap) = encap_chain(&mut pipeline, factory)?;
    let src_fwd = setup_direction(&mut pipeline, traffic, spec, Direction::Forward, factory, vxencap)?;
    let src_rev = setup_direction(&mut pipeline, traffic, spec, Direction::Reverse, factory, vxencap)?;
    pipeline.add_peripheral_output(ethencap, 0, 0)?;

    let producers = if spec.fwd_weight != spec.rev_weight {
        Producers::weighted(
            vec![(src_fwd, spec.fwd_weight), (src_rev, spec.rev_weight)],
            SelectionUnit::Packet,
        )?
    } else {
        Producers::round_robin(vec![src_fwd, src_rev])?
    };
    log::debug!("Producers: {producers}");
    pipeline.set_producers(producers)?;
    pipeline.finish()
}

/// Decapsulate, demultiplex on the tunnel id and answer matched traffic through `port_out`
pub fn setup_rx_pipeline(
    traffic: &TrafficSpec,
    spec: &TestingSpec,
    factory: &dyn StageFactory,
    port_out: &str,
) -> Result<PipelineGraph> {
    let mut pipeline = Pipeline::new(PipelineKind::Rx);
    let vpop = pipeline.instantiate(factory, "VLANPop", None, &NoArgs {})?;
    let vxdecap = pipeline.instantiate(factory, "VXLANDecap", None, &NoArgs {})?;
    let em = pipeline.instantiate(
        factory,
        "ExactMatch",
        Some("tun_demux".to_string()),
        &ExactMatchArgs::tunnel_demux(spec.fwd_pid, spec.rev_pid),
    )?;
    let sink = pipeline.instantiate(factory, "Sink", None, &NoArgs {})?;
    let (vxencap, ethencap) = encap_chain(&mut pipeline, factory)?;
    let out = pipeline.instantiate(
        factory,
        "PortOut",
        Some(port_out.to_string()),
        &PortOutArgs {
            port: port_out.to_string(),
        },
    )?;

    pipeline.add_peripheral_input(0, vpop, 0)?;
    pipeline.add_edge(vpop, 0, vxdecap, 0)?;
    pipeline.add_edge(vxdecap, 0, em, 0)?;
    pipeline.add_edge(em, 0, sink, 0)?;

    for (gate, direction) in [(1, Direction::Forward), (2, Direction::Reverse)] {
        let tag = direction.tag();
        let arp = pipeline.instantiate(
            factory,
            "ArpBlast",
            Some(format!("arp_{tag}")),
            &ArpBlastArgs {
                sha: spec.dummy_mac.to_string(),
            },
        )?;
        let setmd = pipeline.instantiate(
            factory,
            "SetMetadata",
            Some(format!("setmd_{tag}")),
            &tunnel_metadata(traffic, spec, direction),
        )?;
        pipeline.add_edge(em, gate, arp, 0)?;
        pipeline.add_edge(arp, 0, setmd, 0)?;
        pipeline.add_edge(setmd, 0, vxencap, 0)?;
    }
    pipeline.add_edge(ethencap, 0, out, 0)?;
    pipeline.finish()
}
