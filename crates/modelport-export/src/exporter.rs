//! The exporter contract and parallel export.

use futures::future::join_all;
use modelport_common::{ExportError, RepresentationKind, Tensor};
use modelport_models::Model;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs an exported artifact set on an input.
pub trait RepresentationRunner: Send + Sync {
    fn run(&self, input: &Tensor) -> anyhow::Result<Tensor>;
}

/// One exported form of a model. Immutable once produced.
#[derive(Clone)]
pub struct Representation {
    kind: RepresentationKind,
    artifacts: Vec<PathBuf>,
    runner: Arc<dyn RepresentationRunner>,
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation").field("kind", &self.kind).field("artifacts", &self.artifacts).finish()
    }
}

impl Representation {
    pub fn new(kind: RepresentationKind, artifacts: Vec<PathBuf>, runner: Arc<dyn RepresentationRunner>) -> Self {
        Self { kind, artifacts, runner }
    }

    pub fn kind(&self) -> RepresentationKind {
        self.kind
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Run `input` through this representation's own execution path.
    pub fn run(&self, input: &Tensor) -> anyhow::Result<Tensor> {
        self.runner.run(input)
    }
}

pub trait Exporter: Send + Sync {
    fn kind(&self) -> RepresentationKind;

    /// Export `model` into the directory `out`. `sample` only drives tracing
    /// and shape inference.
    fn export(&self, model: &Model, sample: &Tensor, out: &Path) -> Result<Representation, ExportError>;
}

/// Successful representations and per-exporter failures, each in exporter order.
#[derive(Debug, Default)]
pub struct ExportOutcome {
    pub representations: Vec<Representation>,
    pub failures: Vec<ExportError>,
}

impl ExportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every exporter as its own blocking task and join them all.
///
/// A failing or timed-out exporter is recorded in `failures` and never
/// cancels its siblings. A timed-out task is abandoned, not killed.
pub async fn export_all(
    model: Arc<Model>,
    exporters: Vec<Arc<dyn Exporter>>,
    sample: &Tensor,
    out_dir: &Path,
    timeout: Duration,
) -> ExportOutcome {
    let tasks = exporters.into_iter().map(|exporter| {
        let model = Arc::clone(&model);
        let sample = sample.clone();
        let out_dir = out_dir.to_path_buf();
        let stage = exporter.kind();
        async move {
            let handle = tokio::task::spawn_blocking(move || exporter.export(&model, &sample, &out_dir));
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(ExportError::Failed { stage, cause: format!("exporter task failed: {join}") }),
                Err(_) => Err(ExportError::Timeout { stage, after: timeout }),
            }
        }
    });

    let mut outcome = ExportOutcome::default();
    for result in join_all(tasks).await {
        match result {
            Ok(rep) => {
                info!(stage = %rep.kind(), artifacts = ?rep.artifacts(), "exported representation");
                outcome.representations.push(rep);
            }
            Err(e) => {
                warn!(stage = %e.stage(), error = %e, "export failed; continuing without it");
                outcome.failures.push(e);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelport_models::{Layer, NamedLayer};

    struct Echo;
    impl RepresentationRunner for Echo {
        fn run(&self, input: &Tensor) -> anyhow::Result<Tensor> {
            Ok(input.clone())
        }
    }

    enum Behaviour {
        Succeed,
        Fail,
        Sleep(Duration),
        Panic,
    }

    struct Scripted(RepresentationKind, Behaviour);

    impl Exporter for Scripted {
        fn kind(&self) -> RepresentationKind {
            self.0
        }

        fn export(&self, _: &Model, _: &Tensor, out: &Path) -> Result<Representation, ExportError> {
            match &self.1 {
                Behaviour::Succeed => Ok(Representation::new(self.0, vec![out.join("x")], Arc::new(Echo))),
                Behaviour::Fail => Err(ExportError::Failed { stage: self.0, cause: "boom".into() }),
                Behaviour::Sleep(d) => {
                    std::thread::sleep(*d);
                    Ok(Representation::new(self.0, vec![], Arc::new(Echo)))
                }
                Behaviour::Panic => panic!("collaborator crashed"),
            }
        }
    }

    fn relu_model() -> Arc<Model> {
        Arc::new(Model::new(vec![NamedLayer { name: "relu".into(), layer: Layer::Relu }]))
    }

    fn sample() -> Tensor {
        Tensor::from_f32(vec![2], &[1.0, -1.0]).unwrap()
    }

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let exporters: Vec<Arc<dyn Exporter>> = vec![
            Arc::new(Scripted(RepresentationKind::Trace, Behaviour::Fail)),
            Arc::new(Scripted(RepresentationKind::Graph, Behaviour::Succeed)),
            Arc::new(Scripted(RepresentationKind::Engine, Behaviour::Panic)),
        ];
        let dir = tempfile::tempdir().unwrap();
        let outcome = export_all(relu_model(), exporters, &sample(), dir.path(), Duration::from_secs(5)).await;

        assert_eq!(outcome.representations.len(), 1);
        assert_eq!(outcome.representations[0].kind(), RepresentationKind::Graph);
        let stages: Vec<_> = outcome.failures.iter().map(|f| f.stage()).collect();
        assert_eq!(stages, [RepresentationKind::Trace, RepresentationKind::Engine]);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn slow_exporter_times_out() {
        let exporters: Vec<Arc<dyn Exporter>> = vec![
            Arc::new(Scripted(RepresentationKind::Trace, Behaviour::Sleep(Duration::from_millis(500)))),
            Arc::new(Scripted(RepresentationKind::Graph, Behaviour::Succeed)),
        ];
        let dir = tempfile::tempdir().unwrap();
        let outcome = export_all(relu_model(), exporters, &sample(), dir.path(), Duration::from_millis(50)).await;

        assert_eq!(outcome.representations.len(), 1);
        assert!(matches!(
            outcome.failures[..],
            [ExportError::Timeout { stage: RepresentationKind::Trace, after }] if after == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn empty_exporter_set_is_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = export_all(relu_model(), vec![], &sample(), dir.path(), Duration::from_secs(1)).await;
        assert!(outcome.representations.is_empty());
        assert!(outcome.is_complete());
    }
}
