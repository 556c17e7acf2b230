use crate::error::{Error, Result};

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Column width of the attribute names in the textual rendering
const ATTR_WIDTH: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrival {
    #[default]
    Uniform,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationDistribution {
    #[default]
    Uniform,
    Pareto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Arrival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arrival::Uniform => write!(f, "uniform"),
            Arrival::Exponential => write!(f, "exponential"),
        }
    }
}

impl fmt::Display for DurationDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationDistribution::Uniform => write!(f, "uniform"),
            DurationDistribution::Pareto => write!(f, "pareto"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// The two endpoints simulated by the tunnel testing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    pub fn tag(self) -> &'static str {
        match self {
            Direction::Forward => "fwd",
            Direction::Reverse => "rev",
        }
    }
}

/// Inclusive bounds of an address or port range. `max >= min` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + Into<u32> + fmt::Display> Bounds<T> {
    pub fn new(field: &'static str, min: T, max: T) -> Result<Self> {
        if max.into() < min.into() {
            return Err(Error::Range {
                field,
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Bounds { min, max })
    }

    /// Number of values past `min`, the range size handed to generation stages
    pub fn size(&self) -> u32 {
        self.max.into() - self.min.into()
    }
}

/// A validated, normalized description of one traffic pattern
#[derive(Debug, Clone)]
pub struct TrafficSpec {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// Target packet rate over all transmit cores. `None` means unconstrained.
    pub pps: Option<f64>,
    pub tx_cores: Vec<u32>,
    pub tx_timestamp_offset: Option<u32>,
    pub rx_timestamp_offset: Option<u32>,
    pub mode: ModeSpec,
}

#[derive(Debug, Clone)]
pub enum ModeSpec {
    FlowGen(FlowGenSpec),
    Testing(TestingSpec),
}

impl ModeSpec {
    pub fn name(&self) -> &'static str {
        match self {
            ModeSpec::FlowGen(_) => "flowgen",
            ModeSpec::Testing(_) => "testing",
        }
    }
}

/// Single-direction multi-flow generation
#[derive(Debug, Clone)]
pub struct FlowGenSpec {
    pub pkt_size: u16,
    pub num_flows: u32,
    /// Seconds. Derived from `num_flows / flow_rate` when `flow_duration_auto` is set.
    pub flow_duration: f64,
    pub flow_duration_auto: bool,
    /// New flows per second
    pub flow_rate: f64,
    pub arrival: Arrival,
    pub duration: DurationDistribution,
    pub src_port: u16,
}

/// Bidirectional VXLAN tunnel testing between two simulated endpoints
#[derive(Debug, Clone)]
pub struct TestingSpec {
    pub pkt_size: u16,
    pub fwd_pid: u32,
    pub rev_pid: u32,
    pub fwd_weight: f64,
    pub rev_weight: f64,
    pub flow_duration: f64,
    pub flow_rate: f64,
    pub pps_per_flow: f64,
    pub core: u32,
    pub fwd_dst_mac: MacAddr,
    pub rev_dst_mac: MacAddr,
    // never empty: an empty list falls back to the primary MAC of its direction
    pub fwd_dst_macs: Vec<MacAddr>,
    pub rev_dst_macs: Vec<MacAddr>,
    pub tun_src_ip: Ipv4Addr,
    pub tun_dst_ip: Ipv4Addr,
    pub src_ips: Bounds<Ipv4Addr>,
    pub dst_ips: Bounds<Ipv4Addr>,
    pub src_ports: Bounds<u16>,
    pub dst_ports: Bounds<u16>,
    pub dummy_mac: MacAddr,
    pub proto: Option<Protocol>,
    pub quick_rampup: bool,
}

impl TestingSpec {
    pub fn tunnel_id(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Forward => self.fwd_pid,
            Direction::Reverse => self.rev_pid,
        }
    }

    pub fn weight(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Forward => self.fwd_weight,
            Direction::Reverse => self.rev_weight,
        }
    }

    /// Candidate next-hop MACs the load balancer of `direction` spreads packets over
    pub fn dst_macs(&self, direction: Direction) -> &[MacAddr] {
        match direction {
            Direction::Forward => &self.fwd_dst_macs,
            Direction::Reverse => &self.rev_dst_macs,
        }
    }

    /// The first candidate MAC, written by the metadata-tag stage before load balancing
    pub fn primary_dst_mac(&self, direction: Direction) -> MacAddr {
        let fallback = match direction {
            Direction::Forward => self.fwd_dst_mac,
            Direction::Reverse => self.rev_dst_mac,
        };
        self.dst_macs(direction).first().copied().unwrap_or(fallback)
    }
}

type Attr<T> = (&'static str, fn(&T) -> String);

const TRAFFIC_ATTRS: &[Attr<TrafficSpec>] = &[
    ("mode", |s| s.mode.name().to_string()),
    ("src_mac", |s| s.src_mac.to_string()),
    ("dst_mac", |s| s.dst_mac.to_string()),
    ("src_ip", |s| s.src_ip.to_string()),
    ("dst_ip", |s| s.dst_ip.to_string()),
    ("pps", |s| optional(s.pps)),
    ("tx_cores", |s| join(&s.tx_cores)),
    ("tx_timestamp_offset", |s| optional(s.tx_timestamp_offset)),
    ("rx_timestamp_offset", |s| optional(s.rx_timestamp_offset)),
];

const FLOWGEN_ATTRS: &[Attr<FlowGenSpec>] = &[
    ("pkt_size", |s| s.pkt_size.to_string()),
    ("num_flows", |s| s.num_flows.to_string()),
    ("flow_duration", |s| {
        if s.flow_duration_auto {
            format!("auto ({})", s.flow_duration)
        } else {
            s.flow_duration.to_string()
        }
    }),
    ("arrival", |s| s.arrival.to_string()),
    ("duration", |s| s.duration.to_string()),
    ("src_port", |s| s.src_port.to_string()),
    ("flow_rate", |s| s.flow_rate.to_string()),
];

const TESTING_ATTRS: &[Attr<TestingSpec>] = &[
    ("pkt_size", |s| s.pkt_size.to_string()),
    ("fwd_pid", |s| s.fwd_pid.to_string()),
    ("rev_pid", |s| s.rev_pid.to_string()),
    ("fwd_weight", |s| s.fwd_weight.to_string()),
    ("rev_weight", |s| s.rev_weight.to_string()),
    ("flow_duration", |s| s.flow_duration.to_string()),
    ("flow_rate", |s| s.flow_rate.to_string()),
    ("pps_per_flow", |s| s.pps_per_flow.to_string()),
    ("core", |s| s.core.to_string()),
    ("fwd_dst_macs", |s| join(&s.fwd_dst_macs)),
    ("rev_dst_macs", |s| join(&s.rev_dst_macs)),
    ("tun_src_ip", |s| s.tun_src_ip.to_string()),
    ("tun_dst_ip", |s| s.tun_dst_ip.to_string()),
    ("min_src_ip", |s| s.src_ips.min.to_string()),
    ("max_src_ip", |s| s.src_ips.max.to_string()),
    ("min_dst_ip", |s| s.dst_ips.min.to_string()),
    ("max_dst_ip", |s| s.dst_ips.max.to_string()),
    ("min_src_port", |s| s.src_ports.min.to_string()),
    ("max_src_port", |s| s.src_ports.max.to_string()),
    ("min_dst_port", |s| s.dst_ports.min.to_string()),
    ("max_dst_port", |s| s.dst_ports.max.to_string()),
    ("dummy_mac", |s| s.dummy_mac.to_string()),
    ("proto", |s| optional(s.proto)),
    ("quick_rampup", |s| s.quick_rampup.to_string()),
];

fn optional<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

fn join<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_attrs<T>(f: &mut fmt::Formatter<'_>, value: &T, attrs: &[Attr<T>]) -> fmt::Result {
    for (name, render) in attrs {
        writeln!(f, "{:<width$}{}", name, render(value), width = ATTR_WIDTH)?;
    }
    Ok(())
}

impl fmt::Display for TrafficSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_attrs(f, self, TRAFFIC_ATTRS)?;
        match &self.mode {
            ModeSpec::FlowGen(flowgen) => write_attrs(f, flowgen, FLOWGEN_ATTRS),
            ModeSpec::Testing(testing) => write_attrs(f, testing, TESTING_ATTRS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let ports = Bounds::new("src_port", 1000u16, 1010).unwrap();
        assert_eq!(ports.size(), 10);
        let ips = Bounds::new(
            "src_ip",
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 1, 0),
        )
        .unwrap();
        assert_eq!(ips.size(), 255);
        assert_eq!(Bounds::new("dst_port", 7u16, 7).unwrap().size(), 0);
    }

    #[test]
    fn test_negative_bounds() {
        match Bounds::new("dst_port", 2000u16, 1000) {
            Err(Error::Range { field, min, max }) => {
                assert_eq!(field, "dst_port");
                assert_eq!(min, "2000");
                assert_eq!(max, "1000");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
