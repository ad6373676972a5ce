//! Parity receipt: a JSON record of one verification run
//!
//! ## Schema
//!
//! - **v1**: tolerance, sample, per-representation verdict and metrics,
//!   export failures, summary.
//!
//! ```rust,ignore
//! let mut receipt = ParityReceipt::new("model.bin", Tolerance::default(), &SampleInput::default());
//! for result in &results {
//!     receipt.add_result(result);
//! }
//! receipt.finalize();
//! receipt.write_to_file(Path::new("parity-receipt.json"))?;
//! ```

use crate::compare::{ComparisonFailure, ComparisonResult, DivergenceMetrics, Verdict};
use crate::tolerance::Tolerance;
use modelport_common::{ExportError, RepresentationKind, SampleInput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RECEIPT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParityReceipt {
    pub version: u32,

    /// RFC3339 generation time
    pub timestamp: String,

    pub archive: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<String>,

    pub tolerance: Tolerance,

    pub seed: u64,

    pub sample_shape: Vec<usize>,

    #[serde(default)]
    pub rows: Vec<RepresentationRow>,

    #[serde(default)]
    pub export_failures: Vec<ExportFailureRow>,

    #[serde(default)]
    pub summary: Summary,
}

/// One compared representation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepresentationRow {
    pub representation: RepresentationKind,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ComparisonFailure>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DivergenceMetrics>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExportFailureRow {
    pub representation: RepresentationKind,
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Summary {
    /// True when every compared representation passed and none failed to export
    pub all_passed: bool,
    pub compared: usize,
    pub passed: usize,
    pub diverged: Vec<RepresentationKind>,
    pub export_failed: Vec<RepresentationKind>,
    /// Largest absolute difference over all compared representations
    pub max_abs_diff: f32,
}

impl Default for Summary {
    fn default() -> Self {
        Self { all_passed: true, compared: 0, passed: 0, diverged: Vec::new(), export_failed: Vec::new(), max_abs_diff: 0.0 }
    }
}

impl ParityReceipt {
    pub fn new(archive: &str, tolerance: Tolerance, sample: &SampleInput) -> Self {
        Self {
            version: RECEIPT_VERSION,
            timestamp: chrono::Utc::now().to_rfc3339(),
            archive: archive.to_string(),
            skeleton: None,
            tolerance,
            seed: sample.seed,
            sample_shape: sample.shape.clone(),
            rows: Vec::new(),
            export_failures: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn set_skeleton(&mut self, skeleton: &str) {
        self.skeleton = Some(skeleton.to_string());
    }

    pub fn add_result(&mut self, result: &ComparisonResult, artifacts: &[PathBuf]) {
        let failure = match &result.verdict {
            Verdict::Pass => None,
            Verdict::Fail(f) => Some(f.clone()),
        };
        self.rows.push(RepresentationRow {
            representation: result.kind,
            passed: result.is_pass(),
            failure,
            metrics: result.metrics.clone(),
            artifacts: artifacts.to_vec(),
        });
    }

    pub fn add_export_failure(&mut self, error: &ExportError) {
        self.export_failures.push(ExportFailureRow { representation: error.stage(), error: error.to_string() });
    }

    /// Recompute the summary from the rows. Call after the last row is added.
    pub fn finalize(&mut self) {
        let diverged: Vec<_> = self.rows.iter().filter(|r| !r.passed).map(|r| r.representation).collect();
        let export_failed: Vec<_> = self.export_failures.iter().map(|f| f.representation).collect();
        let max_abs_diff =
            self.rows.iter().filter_map(|r| r.metrics.as_ref()).map(|m| m.max_abs_diff).fold(0.0f32, f32::max);

        self.summary = Summary {
            all_passed: diverged.is_empty() && export_failed.is_empty(),
            compared: self.rows.len(),
            passed: self.rows.len() - diverged.len(),
            diverged,
            export_failed,
            max_abs_diff,
        };
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
