//! Exporter adapters, one per collaborator.

use crate::collaborators::{EngineArtifacts, EngineCompiler, InterchangeGraph, TraceEngine};
use crate::exporter::{Exporter, Representation, RepresentationRunner};
use anyhow::Context;
use modelport_common::{ExportError, RepresentationKind, Tensor};
use modelport_models::Model;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const TRACE_FILE: &str = "model.trace.json";
pub const GRAPH_FILE: &str = "model.graph.json";
pub const ENGINE_STEM: &str = "model.engine";

fn failed(stage: RepresentationKind, e: anyhow::Error) -> ExportError {
    ExportError::Failed { stage, cause: format!("{e:#}") }
}

fn prepare(out: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("creating output directory {}", out.display()))
}

pub struct TraceExporter<E: TraceEngine> {
    engine: Arc<E>,
}

impl<E: TraceEngine> TraceExporter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

struct TraceRunner<E: TraceEngine> {
    engine: Arc<E>,
    artifact: PathBuf,
}

impl<E: TraceEngine> RepresentationRunner for TraceRunner<E> {
    fn run(&self, input: &Tensor) -> anyhow::Result<Tensor> {
        self.engine.replay(&self.artifact, input)
    }
}

impl<E: TraceEngine> Exporter for TraceExporter<E> {
    fn kind(&self) -> RepresentationKind {
        RepresentationKind::Trace
    }

    fn export(&self, model: &Model, sample: &Tensor, out: &Path) -> Result<Representation, ExportError> {
        let artifact = prepare(out)
            .and_then(|()| self.engine.trace(model, sample, &out.join(TRACE_FILE)))
            .map_err(|e| failed(self.kind(), e))?;
        debug!(artifact = %artifact.display(), "trace captured");
        let runner = TraceRunner { engine: Arc::clone(&self.engine), artifact: artifact.clone() };
        Ok(Representation::new(self.kind(), vec![artifact], Arc::new(runner)))
    }
}

pub struct GraphExporter<G: InterchangeGraph> {
    graph: Arc<G>,
}

impl<G: InterchangeGraph> GraphExporter<G> {
    pub fn new(graph: G) -> Self {
        Self { graph: Arc::new(graph) }
    }
}

struct GraphRunner<G: InterchangeGraph> {
    graph: Arc<G>,
    artifact: PathBuf,
}

impl<G: InterchangeGraph> RepresentationRunner for GraphRunner<G> {
    fn run(&self, input: &Tensor) -> anyhow::Result<Tensor> {
        self.graph.execute(&self.artifact, input)
    }
}

impl<G: InterchangeGraph> Exporter for GraphExporter<G> {
    fn kind(&self) -> RepresentationKind {
        RepresentationKind::Graph
    }

    fn export(&self, model: &Model, sample: &Tensor, out: &Path) -> Result<Representation, ExportError> {
        let artifact = prepare(out)
            .and_then(|()| self.graph.to_interchange_graph(model, sample, &out.join(GRAPH_FILE)))
            .map_err(|e| failed(self.kind(), e))?;
        debug!(artifact = %artifact.display(), "interchange graph written");
        let runner = GraphRunner { graph: Arc::clone(&self.graph), artifact: artifact.clone() };
        Ok(Representation::new(self.kind(), vec![artifact], Arc::new(runner)))
    }
}

/// Engine compilation does not look at the sample.
pub struct EngineExporter<C: EngineCompiler> {
    compiler: Arc<C>,
}

impl<C: EngineCompiler> EngineExporter<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler: Arc::new(compiler) }
    }
}

struct EngineRunner<C: EngineCompiler> {
    compiler: Arc<C>,
    artifacts: EngineArtifacts,
}

impl<C: EngineCompiler> RepresentationRunner for EngineRunner<C> {
    fn run(&self, input: &Tensor) -> anyhow::Result<Tensor> {
        self.compiler.load_and_run(&self.artifacts.param, &self.artifacts.bin, input)
    }
}

impl<C: EngineCompiler> Exporter for EngineExporter<C> {
    fn kind(&self) -> RepresentationKind {
        RepresentationKind::Engine
    }

    fn export(&self, model: &Model, _sample: &Tensor, out: &Path) -> Result<Representation, ExportError> {
        let artifacts = prepare(out)
            .and_then(|()| self.compiler.compile(model, &out.join(ENGINE_STEM)))
            .map_err(|e| failed(self.kind(), e))?;
        debug!(param = %artifacts.param.display(), bin = %artifacts.bin.display(), "engine compiled");
        let files = vec![artifacts.param.clone(), artifacts.bin.clone()];
        let runner = EngineRunner { compiler: Arc::clone(&self.compiler), artifacts };
        Ok(Representation::new(self.kind(), files, Arc::new(runner)))
    }
}
