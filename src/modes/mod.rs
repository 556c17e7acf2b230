//! Mode compilers: turn a [`TrafficSpec`] into transmit and receive pipelines.

pub mod flowgen;
pub mod testing;

use crate::error::Result;
use crate::pipeline::PipelineGraph;
use crate::stage::StageFactory;
use crate::structs::{ModeSpec, TrafficSpec};

/// Name of the port the testing receive pipeline forwards re-tunneled traffic to
pub const DEFAULT_PORT_OUT: &str = "port_out";

/// A transmit pipeline bound to the core it runs on
#[derive(Debug, Clone)]
pub struct CorePipeline {
    pub core: u32,
    pub graph: PipelineGraph,
}

/// Everything a compilation hands to the execution substrate
#[derive(Debug, Clone)]
pub struct Compiled {
    pub tx: Vec<CorePipeline>,
    pub rx: PipelineGraph,
}

/// Compile `spec` with the stages provided by `factory`.
///
/// Nothing is returned unless every pipeline validated.
pub fn compile(spec: &TrafficSpec, factory: &dyn StageFactory, port_out: &str) -> Result<Compiled> {
    log::info!("Compiling {} pipelines", spec.mode.name());
    let compiled = match &spec.mode {
        ModeSpec::FlowGen(mode) => Compiled {
            tx: flowgen::setup_tx_pipelines(spec, mode, factory)?,
            rx: flowgen::setup_rx_pipeline(factory)?,
        },
        ModeSpec::Testing(mode) => Compiled {
            tx: vec![CorePipeline {
                core: mode.core,
                graph: testing::setup_tx_pipeline(spec, mode, factory)?,
            }],
            rx: testing::setup_rx_pipeline(spec, mode, factory, port_out)?,
        },
    };
    log::debug!(
        "{} transmit pipeline(s), receive pipeline with {} stages",
        compiled.tx.len(),
        compiled.rx.stages().len()
    );
    Ok(compiled)
}
