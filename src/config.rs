use crate::error::{Error, Result};
use crate::structs::*;
use crate::utils::{parse_ipv4, parse_mac};

use pnet::util::MacAddr;
use serde::Deserialize;
use std::net::Ipv4Addr;

const DEFAULT_SRC_MAC: &str = "02:00:00:00:00:01";
const DEFAULT_DST_MAC: &str = "02:00:00:00:00:02";
const DEFAULT_SRC_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);
const DEFAULT_DST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DEFAULT_SRC_PORT: u16 = 1001;
const DEFAULT_DST_PORT: u16 = 12345;
/// Offset of the latency timestamp in tunnel test frames
const DEFAULT_TESTING_TIMESTAMP_OFFSET: u32 = 106;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
/// The configuration file: shared fields plus exactly one mode table
pub struct SpecToml {
    #[serde(default)]
    pub traffic: TrafficToml,
    pub flowgen: Option<FlowGenToml>,
    pub testing: Option<TestingToml>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct TrafficToml {
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub pps: Option<f64>,
    pub tx_cores: Option<Vec<u32>>,
    pub tx_timestamp_offset: Option<u32>,
    pub rx_timestamp_offset: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
/// A flow duration in seconds, or `"auto"` to derive it from the flow rate
pub enum FlowDurationToml {
    Seconds(f64),
    Keyword(AutoKeyword),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoKeyword {
    Auto,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FlowGenToml {
    pub pkt_size: Option<u16>,
    pub num_flows: Option<u32>,
    pub flow_duration: Option<FlowDurationToml>,
    pub flow_rate: Option<f64>,
    pub arrival: Option<Arrival>,
    pub duration: Option<DurationDistribution>,
    pub src_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
/// MAC lists are accepted either as an array or as a space-separated string
pub enum MacListToml {
    Text(String),
    List(Vec<String>),
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct TestingToml {
    pub pkt_size: Option<u16>,
    pub fwd_pid: Option<u32>,
    pub rev_pid: Option<u32>,
    pub fwd_weight: Option<f64>,
    pub rev_weight: Option<f64>,
    pub flow_duration: Option<f64>,
    pub flow_rate: Option<f64>,
    pub pps_per_flow: Option<f64>,
    pub core: Option<u32>,
    pub fwd_dst_mac: Option<String>,
    pub rev_dst_mac: Option<String>,
    pub fwd_dst_macs: Option<MacListToml>,
    pub rev_dst_macs: Option<MacListToml>,
    pub tun_src_ip: Option<String>,
    pub tun_dst_ip: Option<String>,
    pub min_src_ip: Option<String>,
    pub max_src_ip: Option<String>,
    pub min_dst_ip: Option<String>,
    pub max_dst_ip: Option<String>,
    pub min_src_port: Option<u16>,
    pub max_src_port: Option<u16>,
    pub min_dst_port: Option<u16>,
    pub max_dst_port: Option<u16>,
    pub dummy_mac: Option<String>,
    pub proto: Option<Protocol>,
    pub quick_rampup: Option<bool>,
}

fn missing(field: &'static str) -> Error {
    Error::Configuration {
        field,
        reason: "this field is required".to_string(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Configuration {
            field,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn mac_or(field: Option<&str>, default: MacAddr) -> Result<MacAddr> {
    field.map_or(Ok(default), parse_mac)
}

fn ip_or(field: Option<&str>, default: Ipv4Addr) -> Result<Ipv4Addr> {
    field.map_or(Ok(default), parse_ipv4)
}

/// Parse a candidate list, falling back to `[primary]` when it is absent or empty
fn mac_list(list: Option<&MacListToml>, primary: MacAddr) -> Result<Vec<MacAddr>> {
    let macs = match list {
        None => vec![],
        Some(MacListToml::Text(text)) => text
            .split_whitespace()
            .map(parse_mac)
            .collect::<Result<_>>()?,
        Some(MacListToml::List(list)) => {
            list.iter().map(|s| parse_mac(s)).collect::<Result<_>>()?
        }
    };
    if macs.is_empty() {
        Ok(vec![primary])
    } else {
        Ok(macs)
    }
}

impl TryFrom<SpecToml> for TrafficSpec {
    type Error = Error;

    fn try_from(toml: SpecToml) -> Result<Self> {
        let t = toml.traffic;
        let src_mac = mac_or(t.src_mac.as_deref(), parse_mac(DEFAULT_SRC_MAC)?)?;
        let dst_mac = mac_or(t.dst_mac.as_deref(), parse_mac(DEFAULT_DST_MAC)?)?;
        let src_ip = ip_or(t.src_ip.as_deref(), DEFAULT_SRC_IP)?;
        let dst_ip = ip_or(t.dst_ip.as_deref(), DEFAULT_DST_IP)?;
        let pps = t.pps.map(|pps| positive("pps", pps)).transpose()?;
        let tx_cores = t.tx_cores.unwrap_or_else(|| vec![0]);
        if tx_cores.is_empty() {
            return Err(Error::Configuration {
                field: "tx_cores",
                reason: "at least one transmit core is required".to_string(),
            });
        }

        let mode = match (toml.flowgen, toml.testing) {
            (Some(flowgen), None) => ModeSpec::FlowGen(FlowGenSpec::from_toml(flowgen)?),
            (None, Some(testing)) => {
                ModeSpec::Testing(TestingSpec::from_toml(testing, dst_mac, src_ip, dst_ip)?)
            }
            (Some(_), Some(_)) => {
                return Err(Error::Configuration {
                    field: "mode",
                    reason: "both [flowgen] and [testing] are present".to_string(),
                })
            }
            (None, None) => {
                return Err(Error::Configuration {
                    field: "mode",
                    reason: "expected a [flowgen] or a [testing] table".to_string(),
                })
            }
        };

        let mut tx_timestamp_offset = t.tx_timestamp_offset;
        let mut rx_timestamp_offset = t.rx_timestamp_offset;
        if let ModeSpec::Testing(_) = mode {
            // zero offsets count as unset
            for offset in [&mut tx_timestamp_offset, &mut rx_timestamp_offset] {
                if offset.unwrap_or(0) == 0 {
                    *offset = Some(DEFAULT_TESTING_TIMESTAMP_OFFSET);
                }
            }
        }

        Ok(TrafficSpec {
            src_mac,
            dst_mac,
            src_ip,
            dst_ip,
            pps,
            tx_cores,
            tx_timestamp_offset,
            rx_timestamp_offset,
            mode,
        })
    }
}

impl FlowGenSpec {
    fn from_toml(toml: FlowGenToml) -> Result<Self> {
        let num_flows = toml.num_flows.unwrap_or(10);
        if num_flows == 0 {
            return Err(Error::Configuration {
                field: "num_flows",
                reason: "at least one flow is required".to_string(),
            });
        }
        let flow_duration = match toml.flow_duration {
            None => Some(5.0),
            Some(FlowDurationToml::Seconds(d)) => Some(d),
            Some(FlowDurationToml::Keyword(AutoKeyword::Auto)) => None,
        };
        let flow_rate = toml.flow_rate;

        let (flow_duration, flow_rate) = match (flow_duration, flow_rate) {
            (Some(d), Some(r)) => (positive("flow_duration", d)?, positive("flow_rate", r)?),
            (Some(d), None) => {
                let d = positive("flow_duration", d).map_err(|_| Error::Configuration {
                    field: "flow_duration",
                    reason: format!("cannot derive flow_rate from a flow duration of {d}"),
                })?;
                (d, f64::from(num_flows) / d)
            }
            (None, Some(r)) => {
                let r = positive("flow_rate", r)?;
                (f64::from(num_flows) / r, r)
            }
            (None, None) => {
                return Err(Error::Configuration {
                    field: "flow_rate",
                    reason: "flow_rate and flow_duration cannot both be derived".to_string(),
                })
            }
        };

        Ok(FlowGenSpec {
            pkt_size: toml.pkt_size.unwrap_or(60),
            num_flows,
            flow_duration,
            flow_duration_auto: toml.flow_duration == Some(FlowDurationToml::Keyword(AutoKeyword::Auto)),
            flow_rate,
            arrival: toml.arrival.unwrap_or_default(),
            duration: toml.duration.unwrap_or_default(),
            src_port: toml.src_port.unwrap_or(DEFAULT_SRC_PORT),
        })
    }
}

impl TestingSpec {
    fn from_toml(
        toml: TestingToml,
        dst_mac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> Result<Self> {
        let fwd_weight = toml.fwd_weight.unwrap_or(1.0);
        let rev_weight = toml.rev_weight.unwrap_or(1.0);
        for (field, weight) in [("fwd_weight", fwd_weight), ("rev_weight", rev_weight)] {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(Error::UnsupportedPolicy(format!(
                    "`{field}` must be positive, got {weight}"
                )));
            }
        }

        let fwd_dst_mac = mac_or(toml.fwd_dst_mac.as_deref(), dst_mac)?;
        let rev_dst_mac = mac_or(toml.rev_dst_mac.as_deref(), dst_mac)?;

        let min_src_ip = ip_or(toml.min_src_ip.as_deref(), src_ip)?;
        let max_src_ip = ip_or(toml.max_src_ip.as_deref(), min_src_ip)?;
        let min_dst_ip = ip_or(toml.min_dst_ip.as_deref(), dst_ip)?;
        let max_dst_ip = ip_or(toml.max_dst_ip.as_deref(), min_dst_ip)?;
        let min_src_port = toml.min_src_port.unwrap_or(DEFAULT_SRC_PORT);
        let max_src_port = toml.max_src_port.unwrap_or(min_src_port);
        let min_dst_port = toml.min_dst_port.unwrap_or(DEFAULT_DST_PORT);
        let max_dst_port = toml.max_dst_port.unwrap_or(min_dst_port);

        let fwd_pid = toml.fwd_pid.ok_or_else(|| missing("fwd_pid"))?;
        let rev_pid = toml.rev_pid.ok_or_else(|| missing("rev_pid"))?;
        if fwd_pid == rev_pid {
            return Err(Error::Configuration {
                field: "rev_pid",
                reason: format!("both directions use tunnel id {rev_pid}"),
            });
        }

        Ok(TestingSpec {
            pkt_size: toml.pkt_size.unwrap_or(60),
            fwd_pid,
            rev_pid,
            fwd_weight,
            rev_weight,
            flow_duration: positive("flow_duration", toml.flow_duration.unwrap_or(10.0))?,
            flow_rate: positive("flow_rate", toml.flow_rate.unwrap_or(100.0))?,
            pps_per_flow: positive("pps_per_flow", toml.pps_per_flow.unwrap_or(1000.0))?,
            core: toml.core.unwrap_or(0),
            fwd_dst_mac,
            rev_dst_mac,
            fwd_dst_macs: mac_list(toml.fwd_dst_macs.as_ref(), fwd_dst_mac)?,
            rev_dst_macs: mac_list(toml.rev_dst_macs.as_ref(), rev_dst_mac)?,
            tun_src_ip: parse_ipv4(toml.tun_src_ip.as_deref().ok_or_else(|| missing("tun_src_ip"))?)?,
            tun_dst_ip: parse_ipv4(toml.tun_dst_ip.as_deref().ok_or_else(|| missing("tun_dst_ip"))?)?,
            src_ips: Bounds::new("src_ip", min_src_ip, max_src_ip)?,
            dst_ips: Bounds::new("dst_ip", min_dst_ip, max_dst_ip)?,
            src_ports: Bounds::new("src_port", min_src_port, max_src_port)?,
            dst_ports: Bounds::new("dst_port", min_dst_port, max_dst_port)?,
            dummy_mac: parse_mac(toml.dummy_mac.as_deref().ok_or_else(|| missing("dummy_mac"))?)?,
            proto: toml.proto,
            quick_rampup: toml.quick_rampup.unwrap_or(false),
        })
    }
}

/// Import a traffic specification from a TOML string
pub fn import_spec(spec_string: &str) -> Result<TrafficSpec> {
    let spec: TrafficSpec = toml::from_str::<SpecToml>(spec_string)?.try_into()?;
    log::info!("\"{}\" traffic specification successfully loaded", spec.mode.name());
    log::trace!("Specification:\n{spec}");
    Ok(spec)
}
