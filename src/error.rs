use crate::pipeline::{Gate, GateSide};

/// Errors raised while building a traffic specification or compiling it into pipelines.
///
/// Every failure is fatal to the compilation that raised it: no partially wired pipeline
/// is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field is missing, or fields contradict each other
    #[error("invalid configuration for `{field}`: {reason}")]
    Configuration { field: &'static str, reason: String },

    /// An address or identifier string could not be parsed
    #[error("malformed {kind} `{value}`")]
    Format { kind: AddressKind, value: String },

    /// The upper bound of a range is below its lower bound
    #[error("range `{field}` is negative: max {max} is below min {min}")]
    Range {
        field: &'static str,
        min: String,
        max: String,
    },

    /// A producer policy that the execution substrate cannot honor
    #[error("unsupported producer policy: {0}")]
    UnsupportedPolicy(String),

    #[error("unknown stage class `{0}`")]
    UnknownStageClass(String),

    #[error("stage #{0} does not belong to this pipeline")]
    UnknownStage(usize),

    #[error("{side} gate {gate} of stage `{stage}` is out of range ({count} available)")]
    GateOutOfRange {
        stage: String,
        side: GateSide,
        gate: Gate,
        count: Gate,
    },

    #[error("output gate {gate} of stage `{stage}` is already connected")]
    GateInUse { stage: String, gate: Gate },

    #[error("stage `{0}` has no incoming edge")]
    Unconnected(String),

    #[error("cycle detected involving stage `{0}`")]
    Cycle(String),

    #[error("transmit pipeline has no producer set")]
    MissingProducers,

    #[error("a producer set is already attached to this pipeline")]
    ProducersAlreadySet,

    #[error("producer `{0}` has input gates and cannot generate traffic")]
    ForeignProducer(String),

    #[error("cannot parse the configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot encode stage arguments: {0}")]
    StageArgs(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Ipv4,
    Mac,
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressKind::Ipv4 => write!(f, "IPv4 address"),
            AddressKind::Mac => write!(f, "MAC address"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
