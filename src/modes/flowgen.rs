use crate::error::{Error, Result};
use crate::modes::CorePipeline;
use crate::packet::{Endpoints, PacketTemplate};
use crate::pipeline::{Pipeline, PipelineGraph, PipelineKind};
use crate::producers::Producers;
use crate::stage::args::{FlowGenArgs, NoArgs};
use crate::stage::StageFactory;
use crate::structs::{FlowGenSpec, TrafficSpec};
use crate::tcp::{build_tcp_template, TcpTemplateInfo};

/// Packet rate of a core when no target is configured, i.e. as fast as possible
pub const DEFAULT_CORE_PPS: f64 = 5e6;
const TEMPLATE_DST_PORT: u16 = 12345;
const TEMPLATE_SEQUENCE: u32 = 12345;
const TEMPLATE_PAYLOAD: &[u8] = b"meow";

/// The slice of the traffic generated by one transmit core
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreShare {
    pub core: u32,
    pub flows: u32,
    pub pps: f64,
    /// First source port of the core; the core owns `flows` ports from there
    pub src_port_base: u16,
}

/// Split flows and packet rate evenly over the transmit cores.
///
/// Remainders of the integer division are dropped. Source-port slices of distinct cores never
/// overlap.
pub fn partition(traffic: &TrafficSpec, spec: &FlowGenSpec) -> Result<Vec<CoreShare>> {
    let num_cores = u32::try_from(traffic.tx_cores.len()).unwrap_or(u32::MAX);
    if num_cores == 0 {
        return Err(Error::Configuration {
            field: "tx_cores",
            reason: "at least one transmit core is required".to_string(),
        });
    }
    let flows = spec.num_flows / num_cores;
    if flows == 0 {
        return Err(Error::Configuration {
            field: "num_flows",
            reason: format!(
                "{} flows cannot be spread over {num_cores} cores",
                spec.num_flows
            ),
        });
    }
    if spec.num_flows % num_cores != 0 {
        log::warn!(
            "{} flows do not divide evenly over {num_cores} cores, {} are dropped",
            spec.num_flows,
            spec.num_flows % num_cores
        );
    }
    let pps = traffic
        .pps
        .map_or(DEFAULT_CORE_PPS, |pps| pps / f64::from(num_cores));

    traffic
        .tx_cores
        .iter()
        .zip(0u64..)
        .map(|(core, i)| {
            let base = u64::from(spec.src_port) + i * u64::from(flows);
            let last = base + u64::from(flows) - 1;
            let src_port_base = u16::try_from(base)
                .ok()
                .filter(|_| last <= u64::from(u16::MAX))
                .ok_or_else(|| Error::Range {
                    field: "src_port",
                    min: last.to_string(),
                    max: u16::MAX.to_string(),
                })?;
            Ok(CoreShare {
                core: *core,
                flows,
                pps,
                src_port_base,
            })
        })
        .collect()
}

/// The TCP SYN frame every flow of a core is derived from
pub fn template(traffic: &TrafficSpec, src_port: u16) -> Result<PacketTemplate> {
    let endpoints = Endpoints {
        src_mac: traffic.src_mac,
        dst_mac: traffic.dst_mac,
        src_ip: traffic.src_ip,
        dst_ip: traffic.dst_ip,
        src_port,
        dst_port: TEMPLATE_DST_PORT,
    };
    let info = TcpTemplateInfo {
        sequence: TEMPLATE_SEQUENCE,
        ..Default::default()
    };
    build_tcp_template(&endpoints, &info, TEMPLATE_PAYLOAD).ok_or_else(|| Error::Configuration {
        field: "template",
        reason: "cannot build the TCP template".to_string(),
    })
}

fn setup_tx_pipeline(
    traffic: &TrafficSpec,
    spec: &FlowGenSpec,
    share: &CoreShare,
    factory: &dyn StageFactory,
) -> Result<PipelineGraph> {
    let mut pipeline = Pipeline::new(PipelineKind::Tx);
    let args = FlowGenArgs {
        template: template(traffic, share.src_port_base)?,
        pps: share.pps,
        flow_rate: spec.flow_rate,
        flow_duration: spec.flow_duration,
        arrival: spec.arrival,
        duration: spec.duration,
        quick_rampup: false,
        ip_src_range: None,
        ip_dst_range: None,
        port_src_range: Some(share.flows),
        port_dst_range: None,
    };
    let src = pipeline.instantiate(
        factory,
        "FlowGen",
        Some(format!("flowgen_c{}", share.core)),
        &args,
    )?;
    let cksum = pipeline.instantiate(factory, "IPChecksum", None, &NoArgs {})?;
    pipeline.add_edge(src, 0, cksum, 0)?;
    pipeline.add_peripheral_output(cksum, 0, 0)?;
    pipeline.set_producers(Producers::round_robin(vec![src])?)?;
    pipeline.finish()
}

/// One independent transmit pipeline per core
pub fn setup_tx_pipelines(
    traffic: &TrafficSpec,
    spec: &FlowGenSpec,
    factory: &dyn StageFactory,
) -> Result<Vec<CorePipeline>> {
    partition(traffic, spec)?
        .iter()
        .map(|share| {
            log::debug!(
                "Core {}: {} flows from port {}, {} pps",
                share.core,
                share.flows,
                share.src_port_base,
                share.pps
            );
            Ok(CorePipeline {
                core: share.core,
                graph: setup_tx_pipeline(traffic, spec, share, factory)?,
            })
        })
        .collect()
}

/// Received traffic is dropped
pub fn setup_rx_pipeline(factory: &dyn StageFactory) -> Result<PipelineGraph> {
    let mut pipeline = Pipeline::new(PipelineKind::Rx);
    let sink = pipeline.instantiate(factory, "Sink", None, &NoArgs {})?;
    pipeline.add_peripheral_input(0, sink, 0)?;
    pipeline.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::import_spec;
    use crate::stage::StageRegistry;
    use crate::structs::ModeSpec;

    fn load(toml: &str) -> (TrafficSpec, FlowGenSpec) {
        let traffic = import_spec(toml).unwrap();
        let ModeSpec::FlowGen(spec) = traffic.mode.clone() else {
            panic!("not a flowgen spec");
        };
        (traffic, spec)
    }

    #[test]
    fn test_two_cores_scenario() {
        let (traffic, spec) = load(
            r#"
[traffic]
tx_cores = [0, 1]

[flowgen]
num_flows = 10
flow_duration = 5
"#,
        );
        assert_eq!(spec.flow_rate, 2.0);

        let shares = partition(&traffic, &spec).unwrap();
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|s| s.flows == 5 && s.pps == 5e6));
        assert_eq!(shares.iter().map(|s| s.flows).sum::<u32>(), 10);
        assert_eq!(shares[0].src_port_base, 1001);
        assert_eq!(shares[1].src_port_base, 1006);

        let pipelines = setup_tx_pipelines(&traffic, &spec, &StageRegistry::builtin()).unwrap();
        assert_eq!(pipelines[1].core, 1);
        let graph = &pipelines[1].graph;
        let flowgen = graph.find("flowgen_c1").unwrap();
        let args: FlowGenArgs = serde_json::from_value(flowgen.args.clone()).unwrap();
        assert_eq!(args.port_src_range, Some(5));
        assert_eq!(args.flow_rate, 2.0);
        assert_eq!(args.flow_duration, 5.0);
        assert!(!args.quick_rampup);
        assert_eq!(args.template, template(&traffic, 1006).unwrap());
        assert_eq!(graph.successor(flowgen.id, 0).unwrap().class, "IPChecksum");
        assert_eq!(graph.peripheral_outputs().len(), 1);
        assert_eq!(
            graph.producers(),
            Some(&Producers::round_robin(vec![flowgen.id]).unwrap())
        );
    }

    #[test]
    fn test_rate_conservation() {
        for (cores, pps) in [(1, 1000.0), (2, 1000.0), (4, 1000.0), (5, 700.0)] {
            let (traffic, spec) = load(&format!(
                r#"
[traffic]
pps = {pps}
tx_cores = {:?}

[flowgen]
num_flows = 20
"#,
                (0..cores).collect::<Vec<u32>>()
            ));
            let shares = partition(&traffic, &spec).unwrap();
            assert_eq!(shares.iter().map(|s| s.flows).sum::<u32>(), 20);
            let total: f64 = shares.iter().map(|s| s.pps).sum();
            assert!((total - pps).abs() < 1e-6);
        }
    }

    #[test]
    fn test_disjoint_port_slices() {
        let (traffic, spec) = load(
            r#"
[traffic]
tx_cores = [3, 5, 7]

[flowgen]
num_flows = 31
src_port = 2000
"#,
        );
        let shares = partition(&traffic, &spec).unwrap();
        // the remainder flow is dropped
        assert!(shares.iter().all(|s| s.flows == 10));
        for pair in shares.windows(2) {
            assert_eq!(
                u32::from(pair[0].src_port_base) + pair[0].flows,
                u32::from(pair[1].src_port_base)
            );
        }
        assert_eq!(shares[2].core, 7);
    }

    #[test]
    fn test_partition_errors() {
        let (traffic, spec) = load(
            r#"
[traffic]
tx_cores = [0, 1, 2]

[flowgen]
num_flows = 2
"#,
        );
        assert!(matches!(
            partition(&traffic, &spec),
            Err(Error::Configuration {
                field: "num_flows",
                ..
            })
        ));

        let (traffic, spec) = load(
            r#"
[traffic]
tx_cores = [0, 1]

[flowgen]
num_flows = 100
src_port = 65500
"#,
        );
        assert!(matches!(
            partition(&traffic, &spec),
            Err(Error::Range {
                field: "src_port",
                ..
            })
        ));
    }

    #[test]
    fn test_rx_drops_everything() {
        let graph = setup_rx_pipeline(&StageRegistry::builtin()).unwrap();
        assert_eq!(graph.kind(), PipelineKind::Rx);
        assert_eq!(graph.stages().len(), 1);
        assert_eq!(graph.stages()[0].class, "Sink");
        assert_eq!(graph.peripheral_inputs()[0].stage, graph.stages()[0].id);
        assert!(graph.producers().is_none());
    }
}
