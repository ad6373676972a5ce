//! Representation exporters
//!
//! Each exporter adapts exactly one external collaborator (trace engine,
//! interchange-graph exporter, inference-engine compiler) to the shared
//! [`Exporter`] contract. [`export_all`] runs a set of exporters in parallel
//! and collects successes and failures independently.
//!
//! Reference collaborators live in [`reference`] behind the `trace`, `graph`
//! and `engine` features.

pub mod adapters;
pub mod collaborators;
pub mod exporter;
pub mod reference;

pub use adapters::{EngineExporter, GraphExporter, TraceExporter};
pub use collaborators::{EngineArtifacts, EngineCompiler, InterchangeGraph, TraceEngine};
pub use exporter::{ExportOutcome, Exporter, Representation, RepresentationRunner, export_all};
pub use reference::default_exporters;
