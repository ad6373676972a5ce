//! Contracts of the external collaborators an exporter delegates to.
//!
//! Artifact byte layouts belong to the collaborator. The core only relies on
//! an artifact loading back through the same collaborator into something that
//! can run the sample input.

use modelport_common::Tensor;
use modelport_models::Model;
use std::path::{Path, PathBuf};

/// Captures a model as a replayable program.
pub trait TraceEngine: Send + Sync + 'static {
    /// Trace `model` on `sample` and write the program to `out`.
    fn trace(&self, model: &Model, sample: &Tensor, out: &Path) -> anyhow::Result<PathBuf>;

    fn replay(&self, artifact: &Path, input: &Tensor) -> anyhow::Result<Tensor>;
}

/// Serializes a model to an interchange graph and executes such graphs.
pub trait InterchangeGraph: Send + Sync + 'static {
    fn to_interchange_graph(&self, model: &Model, sample: &Tensor, out: &Path) -> anyhow::Result<PathBuf>;

    fn execute(&self, graph: &Path, input: &Tensor) -> anyhow::Result<Tensor>;
}

/// Files produced by an [`EngineCompiler`]: a structure file and a weight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineArtifacts {
    pub param: PathBuf,
    pub bin: PathBuf,
}

/// Compiles a model for an inference engine and runs the result.
pub trait EngineCompiler: Send + Sync + 'static {
    /// Compile `model`, writing `<out>.param` and `<out>.bin`.
    fn compile(&self, model: &Model, out: &Path) -> anyhow::Result<EngineArtifacts>;

    fn load_and_run(&self, param: &Path, bin: &Path, input: &Tensor) -> anyhow::Result<Tensor>;
}
