//! Reference collaborators, selected by cargo feature.

#[cfg(feature = "engine")]
pub mod engine;
#[cfg(feature = "graph")]
pub mod graph;
#[cfg(feature = "trace")]
pub mod trace;

use crate::exporter::Exporter;
use modelport_common::RepresentationKind;
use std::sync::Arc;
use tracing::warn;

/// Representation kinds whose reference collaborator is compiled in.
pub fn available() -> Vec<RepresentationKind> {
    RepresentationKind::ALL.iter().copied().filter(|k| reference_exporter(*k).is_some()).collect()
}

/// Exporters for `kinds` backed by the reference collaborators.
///
/// Kinds whose feature is disabled are skipped with a warning.
pub fn default_exporters(kinds: &[RepresentationKind]) -> Vec<Arc<dyn Exporter>> {
    kinds
        .iter()
        .filter_map(|&kind| {
            let exporter = reference_exporter(kind);
            if exporter.is_none() {
                warn!(stage = %kind, feature = kind.name(), "collaborator not compiled in; skipping");
            }
            exporter
        })
        .collect()
}

fn reference_exporter(kind: RepresentationKind) -> Option<Arc<dyn Exporter>> {
    match kind {
        #[cfg(feature = "trace")]
        RepresentationKind::Trace => Some(Arc::new(crate::TraceExporter::new(trace::JsonTraceEngine))),
        #[cfg(feature = "graph")]
        RepresentationKind::Graph => Some(Arc::new(crate::GraphExporter::new(graph::JsonInterchangeGraph))),
        #[cfg(feature = "engine")]
        RepresentationKind::Engine => Some(Arc::new(crate::EngineExporter::new(engine::TextEngineCompiler))),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
