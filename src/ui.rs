//! Text listings of compiled pipelines.

use crate::modes::Compiled;
use crate::pipeline::{PipelineGraph, StageId};

use std::fmt;

fn stage_label(graph: &PipelineGraph, id: StageId) -> String {
    graph
        .stage(id)
        .map_or_else(|| id.to_string(), |stage| stage.name.clone())
}

/// Stages in topological order, then edges and producers
impl fmt::Display for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} pipeline", self.kind())?;
        for stage in self.topological_order().iter().filter_map(|id| self.stage(*id)) {
            writeln!(
                f,
                "  {:<20} {:<12} in:{} out:{}",
                stage.name, stage.class, stage.input_gates, stage.output_gates
            )?;
        }
        for edge in self.peripheral_inputs() {
            writeln!(
                f,
                "  port:{} -> {}:{}",
                edge.port_gate,
                stage_label(self, edge.stage),
                edge.gate
            )?;
        }
        for edge in self.edges() {
            writeln!(
                f,
                "  {}:{} -> {}:{}",
                stage_label(self, edge.src),
                edge.ogate,
                stage_label(self, edge.dst),
                edge.igate
            )?;
        }
        for edge in self.peripheral_outputs() {
            writeln!(
                f,
                "  {}:{} -> port:{}",
                stage_label(self, edge.stage),
                edge.gate,
                edge.port_gate
            )?;
        }
        if let Some(producers) = self.producers() {
            let names: Vec<String> = producers
                .stages()
                .into_iter()
                .map(|id| stage_label(self, id))
                .collect();
            writeln!(f, "  producers: {producers} ({})", names.join(", "))?;
        }
        Ok(())
    }
}

/// Transmit pipelines first, each prefixed with its core
impl fmt::Display for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tx in &self.tx {
            writeln!(f, "[core {}] {}", tx.core, tx.graph)?;
        }
        write!(f, "{}", self.rx)
    }
}
