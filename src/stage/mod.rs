//! Stage handles and the factory that builds them.
//!
//! A stage is an external packet-processing primitive. The compilers only know its class name,
//! its named construction parameters and how many input and output gates it exposes; the
//! factory is injected so that any execution substrate can provide its own catalogue.

pub mod args;

use crate::error::{Error, Result};
use crate::pipeline::Gate;
use args::{ExactMatchArgs, HashLbArgs};

use serde_json::Value;
use std::collections::HashMap;

/// A constructed, not yet inserted stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageHandle {
    pub class: String,
    pub name: Option<String>,
    pub args: Value,
    pub input_gates: Gate,
    pub output_gates: Gate,
}

impl StageHandle {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Decode the construction parameters back into their typed record
    pub fn decode_args<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.args.clone())?)
    }
}

/// Resolves a stage class name into a stage handle
pub trait StageFactory {
    fn create(&self, class: &str, args: Value) -> Result<StageHandle>;
}

/// Number of gates on one side of a stage
#[derive(Debug, Clone, Copy)]
pub enum GateArity {
    Fixed(Gate),
    /// Computed from the construction parameters
    Dynamic(fn(&Value) -> Result<Gate>),
}

impl GateArity {
    fn resolve(&self, args: &Value) -> Result<Gate> {
        match self {
            GateArity::Fixed(count) => Ok(*count),
            GateArity::Dynamic(count) => count(args),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StageClass {
    pub name: &'static str,
    pub input_gates: GateArity,
    pub output_gates: GateArity,
}

impl StageClass {
    pub const fn fixed(name: &'static str, input_gates: Gate, output_gates: Gate) -> Self {
        StageClass {
            name,
            input_gates: GateArity::Fixed(input_gates),
            output_gates: GateArity::Fixed(output_gates),
        }
    }
}

fn gate_count(field: &'static str, count: usize) -> Result<Gate> {
    Gate::try_from(count).map_err(|_| Error::Configuration {
        field,
        reason: format!("{count} gates exceed the gate index space"),
    })
}

fn hash_lb_gates(args: &Value) -> Result<Gate> {
    let args: HashLbArgs = serde_json::from_value(args.clone())?;
    gate_count("gates", args.gates.len())
}

fn exact_match_gates(args: &Value) -> Result<Gate> {
    let args: ExactMatchArgs = serde_json::from_value(args.clone())?;
    gate_count("rules", usize::from(args.max_gate()) + 1)
}

/// The stage classes the compilers instantiate
pub const BUILTIN_CLASSES: &[StageClass] = &[
    StageClass::fixed("FlowGen", 0, 1),
    StageClass::fixed("IPChecksum", 1, 1),
    StageClass::fixed("SetMetadata", 1, 1),
    StageClass {
        name: "HashLB",
        input_gates: GateArity::Fixed(1),
        output_gates: GateArity::Dynamic(hash_lb_gates),
    },
    StageClass::fixed("Update", 1, 1),
    StageClass::fixed("VXLANEncap", 1, 1),
    StageClass::fixed("VXLANDecap", 1, 1),
    StageClass::fixed("IPEncap", 1, 1),
    StageClass::fixed("EtherEncap", 1, 1),
    StageClass::fixed("VLANPop", 1, 1),
    StageClass {
        name: "ExactMatch",
        input_gates: GateArity::Fixed(1),
        output_gates: GateArity::Dynamic(exact_match_gates),
    },
    StageClass::fixed("ArpBlast", 1, 1),
    StageClass::fixed("Sink", 1, 0),
    StageClass::fixed("PortOut", 1, 0),
];

/// A catalogue of stage classes indexed by name
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    classes: HashMap<&'static str, StageClass>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for class in BUILTIN_CLASSES {
            registry.register(*class);
        }
        registry
    }

    pub fn register(&mut self, class: StageClass) {
        log::trace!("Registering stage class {}", class.name);
        self.classes.insert(class.name, class);
    }
}

impl StageFactory for StageRegistry {
    fn create(&self, class: &str, args: Value) -> Result<StageHandle> {
        let stage_class = self
            .classes
            .get(class)
            .ok_or_else(|| Error::UnknownStageClass(class.to_string()))?;
        Ok(StageHandle {
            class: stage_class.name.to_string(),
            name: None,
            input_gates: stage_class.input_gates.resolve(&args)?,
            output_gates: stage_class.output_gates.resolve(&args)?,
            args,
        })
    }
}
