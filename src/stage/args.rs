//! Named-parameter records passed to stage constructors. They are encoded as JSON objects in
//! the [`StageHandle`](super::StageHandle) so that any registry can consume them.

use crate::packet::PacketTemplate;
use crate::pipeline::Gate;
use crate::structs::{Arrival, DurationDistribution};
use crate::utils::mac_bits;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Arguments of stages configured by their class alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGenArgs {
    pub template: PacketTemplate,
    pub pps: f64,
    pub flow_rate: f64,
    pub flow_duration: f64,
    pub arrival: Arrival,
    pub duration: DurationDistribution,
    pub quick_rampup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_src_range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_dst_range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_src_range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_dst_range: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttr {
    pub name: String,
    /// Size in bytes; the value is written big-endian
    pub size: u8,
    pub value_int: u64,
}

impl MetadataAttr {
    pub fn new(name: &str, size: u8, value_int: u64) -> Self {
        MetadataAttr {
            name: name.to_string(),
            size,
            value_int,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMetadataArgs {
    pub attrs: Vec<MetadataAttr>,
}

impl SetMetadataArgs {
    /// Tunnel endpoints, tunnel identifier and outer Ethernet addresses of one direction
    pub fn tunnel(
        tun_src_ip: Ipv4Addr,
        tun_dst_ip: Ipv4Addr,
        tun_id: u32,
        ether_src: MacAddr,
        ether_dst: MacAddr,
    ) -> Self {
        SetMetadataArgs {
            attrs: vec![
                MetadataAttr::new("tun_ip_src", 4, u32::from(tun_src_ip).into()),
                MetadataAttr::new("tun_ip_dst", 4, u32::from(tun_dst_ip).into()),
                MetadataAttr::new("tun_id", 4, tun_id.into()),
                MetadataAttr::new("ether_src", 6, mac_bits(ether_src)),
                MetadataAttr::new("ether_dst", 6, mac_bits(ether_dst)),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value_int)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    L2,
    L3,
    L4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLbArgs {
    pub mode: HashMode,
    pub gates: Vec<Gate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub offset: u16,
    pub size: u8,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArgs {
    pub fields: Vec<FieldUpdate>,
}

impl UpdateArgs {
    /// Overwrite the Ethernet destination, the first six bytes of the frame
    pub fn ether_dst(mac: MacAddr) -> Self {
        UpdateArgs {
            fields: vec![FieldUpdate {
                offset: 0,
                size: 6,
                value: mac_bits(mac),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpBlastArgs {
    /// Sender hardware address announced in the ARP replies
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchField {
    pub attr_name: String,
    pub num_bytes: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Key bytes in network byte order, one group per field
    pub values: Vec<u8>,
    pub gate: Gate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchArgs {
    pub fields: Vec<MatchField>,
    pub default_gate: Gate,
    pub rules: Vec<MatchRule>,
}

impl ExactMatchArgs {
    /// Demultiplex decapsulated frames on their tunnel identifier: forward traffic leaves on
    /// gate 1, reverse traffic on gate 2, anything else on the default gate 0.
    pub fn tunnel_demux(fwd_id: u32, rev_id: u32) -> Self {
        ExactMatchArgs {
            fields: vec![MatchField {
                attr_name: "tun_id".to_string(),
                num_bytes: 4,
            }],
            default_gate: 0,
            rules: vec![
                MatchRule {
                    values: fwd_id.to_be_bytes().to_vec(),
                    gate: 1,
                },
                MatchRule {
                    values: rev_id.to_be_bytes().to_vec(),
                    gate: 2,
                },
            ],
        }
    }

    /// The gate a frame whose concatenated field bytes equal `key` leaves on.
    /// The first matching rule wins.
    pub fn route(&self, key: &[u8]) -> Gate {
        self.rules
            .iter()
            .find(|rule| rule.values == key)
            .map_or(self.default_gate, |rule| rule.gate)
    }

    /// Highest gate referenced by the table, default included
    pub fn max_gate(&self) -> Gate {
        self.rules
            .iter()
            .map(|rule| rule.gate)
            .fold(self.default_gate, Gate::max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOutArgs {
    pub port: String,
}
