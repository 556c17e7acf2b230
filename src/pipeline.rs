//! Gate-wired stage graphs.
//!
//! A [`Pipeline`] is the mutable builder used by the mode compilers. [`Pipeline::finish`]
//! validates it and freezes it into a [`PipelineGraph`], the artifact handed to the execution
//! substrate.

use crate::error::{Error, Result};
use crate::producers::Producers;
use crate::stage::{StageFactory, StageHandle};

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Index of an input or output port of a stage
pub type Gate = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StageId(usize);

impl StageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSide {
    Input,
    Output,
}

impl fmt::Display for GateSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateSide::Input => write!(f, "input"),
            GateSide::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Tx,
    Rx,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Tx => write!(f, "tx"),
            PipelineKind::Rx => write!(f, "rx"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub src: StageId,
    pub ogate: Gate,
    pub dst: StageId,
    pub igate: Gate,
}

/// Connection between a stage gate and a gate of the port the pipeline is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeripheralEdge {
    pub port_gate: Gate,
    pub stage: StageId,
    pub gate: Gate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub class: String,
    pub args: serde_json::Value,
    pub input_gates: Gate,
    pub output_gates: Gate,
}

#[derive(Debug)]
pub struct Pipeline {
    kind: PipelineKind,
    stages: Vec<Stage>,
    edges: Vec<Edge>,
    peripheral_inputs: Vec<PeripheralEdge>,
    peripheral_outputs: Vec<PeripheralEdge>,
    producers: Option<Producers>,
    used_outputs: HashSet<(StageId, Gate)>,
}

impl Pipeline {
    pub fn new(kind: PipelineKind) -> Self {
        Pipeline {
            kind,
            stages: vec![],
            edges: vec![],
            peripheral_inputs: vec![],
            peripheral_outputs: vec![],
            producers: None,
            used_outputs: HashSet::new(),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Insert a stage. Unnamed stages are named after their class and index.
    pub fn add_stage(&mut self, handle: StageHandle) -> Result<StageId> {
        let id = StageId(self.stages.len());
        let name = handle
            .name
            .unwrap_or_else(|| format!("{}{}", handle.class.to_lowercase(), id.0));
        if self.stages.iter().any(|stage| stage.name == name) {
            return Err(Error::Configuration {
                field: "name",
                reason: format!("stage `{name}` already exists in the {} pipeline", self.kind),
            });
        }
        log::trace!("{} pipeline: stage {id} `{name}` ({})", self.kind, handle.class);
        self.stages.push(Stage {
            id,
            name,
            class: handle.class,
            args: handle.args,
            input_gates: handle.input_gates,
            output_gates: handle.output_gates,
        });
        Ok(id)
    }

    /// Construct a stage through `factory` and insert it
    pub fn instantiate<A: Serialize>(
        &mut self,
        factory: &dyn StageFactory,
        class: &str,
        name: Option<String>,
        args: &A,
    ) -> Result<StageId> {
        let mut handle = factory.create(class, serde_json::to_value(args)?)?;
        if name.is_some() {
            handle.name = name;
        }
        self.add_stage(handle)
    }

    pub fn stage(&self, id: StageId) -> Result<&Stage> {
        self.stages.get(id.0).ok_or(Error::UnknownStage(id.0))
    }

    fn check_gate(&self, id: StageId, side: GateSide, gate: Gate) -> Result<()> {
        let stage = self.stage(id)?;
        let count = match side {
            GateSide::Input => stage.input_gates,
            GateSide::Output => stage.output_gates,
        };
        if gate >= count {
            return Err(Error::GateOutOfRange {
                stage: stage.name.clone(),
                side,
                gate,
                count,
            });
        }
        Ok(())
    }

    /// Output gates carry packets to a single destination; input gates may merge many edges.
    fn claim_output(&mut self, id: StageId, gate: Gate) -> Result<()> {
        self.check_gate(id, GateSide::Output, gate)?;
        if !self.used_outputs.insert((id, gate)) {
            return Err(Error::GateInUse {
                stage: self.stage(id)?.name.clone(),
                gate,
            });
        }
        Ok(())
    }

    pub fn add_edge(&mut self, src: StageId, ogate: Gate, dst: StageId, igate: Gate) -> Result<()> {
        self.check_gate(dst, GateSide::Input, igate)?;
        self.claim_output(src, ogate)?;
        log::trace!(
            "{} pipeline: {}:{ogate} -> {}:{igate}",
            self.kind,
            self.stages[src.0].name,
            self.stages[dst.0].name
        );
        self.edges.push(Edge {
            src,
            ogate,
            dst,
            igate,
        });
        Ok(())
    }

    /// Feed gate `port_gate` of the attached port into `stage`
    pub fn add_peripheral_input(&mut self, port_gate: Gate, stage: StageId, igate: Gate) -> Result<()> {
        self.check_gate(stage, GateSide::Input, igate)?;
        log::trace!(
            "{} pipeline: port:{port_gate} -> {}:{igate}",
            self.kind,
            self.stages[stage.0].name
        );
        self.peripheral_inputs.push(PeripheralEdge {
            port_gate,
            stage,
            gate: igate,
        });
        Ok(())
    }

    /// Send the packets leaving `stage` to gate `port_gate` of the attached port
    pub fn add_peripheral_output(&mut self, stage: StageId, ogate: Gate, port_gate: Gate) -> Result<()> {
        self.claim_output(stage, ogate)?;
        log::trace!(
            "{} pipeline: {}:{ogate} -> port:{port_gate}",
            self.kind,
            self.stages[stage.0].name
        );
        self.peripheral_outputs.push(PeripheralEdge {
            port_gate,
            stage,
            gate: ogate,
        });
        Ok(())
    }

    /// Attach the producer set. Producers must be stages of this pipeline without input gates.
    pub fn set_producers(&mut self, producers: Producers) -> Result<()> {
        if self.producers.is_some() {
            return Err(Error::ProducersAlreadySet);
        }
        for id in producers.stages() {
            let stage = self.stage(id)?;
            if stage.input_gates > 0 {
                return Err(Error::ForeignProducer(stage.name.clone()));
            }
        }
        self.producers = Some(producers);
        Ok(())
    }

    /// Validate the wiring and freeze the pipeline.
    ///
    /// Every stage with input gates must be fed by an edge or by the port, a transmit pipeline
    /// needs a producer set, and the graph must be acyclic.
    pub fn finish(self) -> Result<PipelineGraph> {
        if self.kind == PipelineKind::Tx && self.producers.is_none() {
            return Err(Error::MissingProducers);
        }

        let mut in_degree = vec![0usize; self.stages.len()];
        for edge in &self.edges {
            in_degree[edge.dst.0] += 1;
        }
        let fed_by_port: HashSet<StageId> =
            self.peripheral_inputs.iter().map(|edge| edge.stage).collect();
        if let Some(stage) = self
            .stages
            .iter()
            .find(|s| s.input_gates > 0 && in_degree[s.id.0] == 0 && !fed_by_port.contains(&s.id))
        {
            return Err(Error::Unconnected(stage.name.clone()));
        }

        // Kahn's algorithm, lowest index first for a stable order
        let mut queue: VecDeque<StageId> = self
            .stages
            .iter()
            .filter(|s| in_degree[s.id.0] == 0)
            .map(|s| s.id)
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge in self.edges.iter().filter(|edge| edge.src == id) {
                in_degree[edge.dst.0] -= 1;
                if in_degree[edge.dst.0] == 0 {
                    queue.push_back(edge.dst);
                }
            }
        }
        if order.len() < self.stages.len() {
            let stuck = self
                .stages
                .iter()
                .find(|s| in_degree[s.id.0] > 0)
                .map_or_else(String::new, |s| s.name.clone());
            return Err(Error::Cycle(stuck));
        }

        log::debug!(
            "{} pipeline compiled: {} stages, {} edges",
            self.kind,
            self.stages.len(),
            self.edges.len()
        );
        Ok(PipelineGraph {
            kind: self.kind,
            stages: self.stages,
            edges: self.edges,
            peripheral_inputs: self.peripheral_inputs,
            peripheral_outputs: self.peripheral_outputs,
            producers: self.producers,
            order,
        })
    }
}

/// A validated, immutable pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineGraph {
    kind: PipelineKind,
    stages: Vec<Stage>,
    edges: Vec<Edge>,
    peripheral_inputs: Vec<PeripheralEdge>,
    peripheral_outputs: Vec<PeripheralEdge>,
    producers: Option<Producers>,
    #[serde(skip)]
    order: Vec<StageId>,
}

impl PipelineGraph {
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn stages_of_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Stage> + 'a {
        self.stages.iter().filter(move |stage| stage.class == class)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn in_edges(&self, id: StageId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.dst == id)
    }

    pub fn out_edges(&self, id: StageId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.src == id)
    }

    /// The stage fed by output gate `ogate` of `id`, if any
    pub fn successor(&self, id: StageId, ogate: Gate) -> Option<&Stage> {
        self.out_edges(id)
            .find(|edge| edge.ogate == ogate)
            .and_then(|edge| self.stage(edge.dst))
    }

    pub fn peripheral_inputs(&self) -> &[PeripheralEdge] {
        &self.peripheral_inputs
    }

    pub fn peripheral_outputs(&self) -> &[PeripheralEdge] {
        &self.peripheral_outputs
    }

    pub fn producers(&self) -> Option<&Producers> {
        self.producers.as_ref()
    }

    /// Stages ordered so that every edge goes forward
    pub fn topological_order(&self) -> &[StageId] {
        &self.order
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stage::StageHandle;
    use serde_json::Value;

    /// Builds stages from a fixed table of (class, inputs, outputs), ignoring arguments
    pub(crate) struct MockFactory;

    impl StageFactory for MockFactory {
        fn create(&self, class: &str, args: Value) -> Result<StageHandle> {
            let (input_gates, output_gates) = match class {
                "Source" => (0, 1),
                "Pass" => (1, 1),
                "Split" => (1, 2),
                "Drop" => (1, 0),
                _ => return Err(Error::UnknownStageClass(class.to_string())),
            };
            Ok(StageHandle {
                class: class.to_string(),
                name: None,
                args,
                input_gates,
                output_gates,
            })
        }
    }

    fn add(pipeline: &mut Pipeline, class: &str) -> StageId {
        pipeline
            .instantiate(&MockFactory, class, None, &serde_json::json!({}))
            .unwrap()
    }

    #[test]
    fn test_linear_tx() {
        let mut pipeline = Pipeline::new(PipelineKind::Tx);
        let src = add(&mut pipeline, "Source");
        let pass = add(&mut pipeline, "Pass");
        pipeline.add_edge(src, 0, pass, 0).unwrap();
        pipeline.add_peripheral_output(pass, 0, 0).unwrap();
        pipeline
            .set_producers(Producers::round_robin(vec![src]).unwrap())
            .unwrap();
        let graph = pipeline.finish().unwrap();

        assert_eq!(graph.kind(), PipelineKind::Tx);
        assert_eq!(graph.topological_order(), &[src, pass]);
        assert_eq!(graph.find("source0").unwrap().id, src);
        assert_eq!(graph.successor(src, 0).unwrap().name, "pass1");
        assert_eq!(graph.peripheral_outputs()[0].stage, pass);
        assert_eq!(graph.in_edges(pass).count(), 1);
    }

    #[test]
    fn test_gate_checks() {
        let mut pipeline = Pipeline::new(PipelineKind::Rx);
        let split = add(&mut pipeline, "Split");
        let drop = add(&mut pipeline, "Drop");
        assert!(matches!(
            pipeline.add_edge(split, 2, drop, 0),
            Err(Error::GateOutOfRange {
                side: GateSide::Output,
                gate: 2,
                count: 2,
                ..
            })
        ));
        assert!(matches!(
            pipeline.add_edge(split, 0, drop, 1),
            Err(Error::GateOutOfRange {
                side: GateSide::Input,
                ..
            })
        ));
        pipeline.add_edge(split, 0, drop, 0).unwrap();
        // merging into an input gate is fine, reusing an output gate is not
        pipeline.add_edge(split, 1, drop, 0).unwrap();
        assert!(matches!(
            pipeline.add_edge(split, 1, drop, 0),
            Err(Error::GateInUse { gate: 1, .. })
        ));
        assert!(matches!(
            pipeline.add_edge(StageId(7), 0, drop, 0),
            Err(Error::UnknownStage(7))
        ));
    }

    #[test]
    fn test_finish_errors() {
        let mut pipeline = Pipeline::new(PipelineKind::Tx);
        add(&mut pipeline, "Source");
        assert!(matches!(pipeline.finish(), Err(Error::MissingProducers)));

        let mut pipeline = Pipeline::new(PipelineKind::Rx);
        add(&mut pipeline, "Pass");
        match pipeline.finish() {
            Err(Error::Unconnected(name)) => assert_eq!(name, "pass0"),
            other => panic!("unexpected result {other:?}"),
        }

        let mut pipeline = Pipeline::new(PipelineKind::Rx);
        let a = add(&mut pipeline, "Pass");
        let b = add(&mut pipeline, "Pass");
        pipeline.add_edge(a, 0, b, 0).unwrap();
        pipeline.add_edge(b, 0, a, 0).unwrap();
        assert!(matches!(pipeline.finish(), Err(Error::Cycle(_))));
    }

    #[test]
    fn test_producers_checks() {
        let mut pipeline = Pipeline::new(PipelineKind::Tx);
        let src = add(&mut pipeline, "Source");
        let pass = add(&mut pipeline, "Pass");
        pipeline.add_edge(src, 0, pass, 0).unwrap();
        match pipeline.set_producers(Producers::round_robin(vec![pass]).unwrap()) {
            Err(Error::ForeignProducer(name)) => assert_eq!(name, "pass1"),
            other => panic!("unexpected result {other:?}"),
        }
        pipeline
            .set_producers(Producers::round_robin(vec![src]).unwrap())
            .unwrap();
        assert!(matches!(
            pipeline.set_producers(Producers::round_robin(vec![src]).unwrap()),
            Err(Error::ProducersAlreadySet)
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let mut pipeline = Pipeline::new(PipelineKind::Rx);
        pipeline
            .instantiate(&MockFactory, "Drop", Some("sink".into()), &serde_json::json!({}))
            .unwrap();
        assert!(matches!(
            pipeline.instantiate(&MockFactory, "Drop", Some("sink".into()), &serde_json::json!({})),
            Err(Error::Configuration { field: "name", .. })
        ));
        assert!(matches!(
            pipeline.instantiate(&MockFactory, "Tee", None, &serde_json::json!({})),
            Err(Error::UnknownStageClass(_))
        ));
    }
}
