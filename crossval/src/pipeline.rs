//! End-to-end verification run.

use crate::compare::ComparisonResult;
use crate::harness::{EquivalenceHarness, HarnessError};
use crate::receipt::ParityReceipt;
use crate::tolerance::Tolerance;
use modelport_archive::ArchiveReader;
use modelport_common::{PortConfig, PortError, SampleInput, Tensor};
use modelport_export::{ExportOutcome, Exporter, export_all};
use modelport_models::{Model, ModelSkeleton, reconstruct};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl PipelineError {
    /// True when the run stopped before a model existed.
    pub fn is_reconstruction(&self) -> bool {
        matches!(self, Self::Port(PortError::Archive(_) | PortError::Model(_)))
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub model: Arc<Model>,
    pub sample: Tensor,
    pub exports: ExportOutcome,
    pub results: Vec<ComparisonResult>,
    pub receipt: ParityReceipt,
}

impl PipelineReport {
    /// Every exported representation passed and none failed to export.
    pub fn all_passed(&self) -> bool {
        self.receipt.summary.all_passed
    }

    pub fn diverged(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.results.iter().filter(|r| !r.is_pass())
    }
}

/// Open `archive`, reconstruct `skeleton`, export through `exporters` and
/// compare every representation against the model.
///
/// Reconstruction failures abort the run. Export failures are recorded and
/// the remaining representations are still compared.
pub async fn run_pipeline(
    archive: &Path,
    skeleton: &ModelSkeleton,
    config: &PortConfig,
    exporters: Vec<Arc<dyn Exporter>>,
) -> Result<PipelineReport, PipelineError> {
    let model = {
        let reader = ArchiveReader::open_with_config(archive, &config.archive).map_err(PortError::from)?;
        let model = reconstruct(&reader, skeleton).map_err(PortError::from)?;
        reader.close();
        Arc::new(model)
    };

    let sample_input = SampleInput::from_config(&config.harness);
    let sample = sample_input.generate().map_err(PortError::from)?;
    let timeout = Duration::from_millis(config.harness.timeout_ms);

    info!(exporters = exporters.len(), out_dir = %config.export.out_dir.display(), "exporting representations");
    let exports = export_all(Arc::clone(&model), exporters, &sample, &config.export.out_dir, timeout).await;

    let harness = EquivalenceHarness::from_config(&config.harness);
    let results = harness.verify(&model, &exports.representations, &sample).await?;

    let mut receipt = ParityReceipt::new(&archive.display().to_string(), Tolerance::from_config(&config.harness), &sample_input);
    for (result, rep) in results.iter().zip(&exports.representations) {
        receipt.add_result(result, rep.artifacts());
    }
    for failure in &exports.failures {
        receipt.add_export_failure(failure);
    }
    receipt.finalize();

    info!(
        compared = receipt.summary.compared,
        passed = receipt.summary.passed,
        export_failures = exports.failures.len(),
        "verification finished"
    );
    Ok(PipelineReport { model, sample, exports, results, receipt })
}
