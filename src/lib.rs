//! Compiler from declarative traffic descriptions to gate-wired packet-stage pipelines.
//! The binary `trafficgraph` prints the compiled pipelines, but the library can be embedded in
//! any execution substrate through the [`stage::StageFactory`] seam.

/// Errors raised by configuration and compilation
pub mod error;
/// Configuration file parsing and normalization
pub mod config;

#[doc(hidden)]
/// Validated traffic specification
pub mod structs;

#[doc(inline)]
pub use structs::*;

/// Address and identifier conversions
pub mod utils;

/// Packet templates handed to generation stages
pub mod packet;
/// TCP-specific fonctions
mod tcp;
/// UDP-specific fonctions
mod udp;

/// Stage handles, factory and construction parameters
pub mod stage;
/// Gate-wired stage graphs
pub mod pipeline;
/// Producer selection policies
pub mod producers;
/// Flow generation and tunnel testing compilers
pub mod modes;

/// Textual rendering of compiled pipelines
pub mod ui;

pub use error::{Error, Result};
