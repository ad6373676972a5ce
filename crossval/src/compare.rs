//! Element-wise comparison of a representation's output against the reference

use crate::tolerance::Tolerance;
use modelport_common::{RepresentationKind, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a representation did not pass. Carried as data, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonFailure {
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },
    Tolerance { mismatched: usize, total: usize },
    ExecutionError { message: String },
    Timeout { after_ms: u64 },
}

impl fmt::Display for ComparisonFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { expected, actual } => write!(f, "shape {actual:?} differs from reference {expected:?}"),
            Self::Tolerance { mismatched, total } => write!(f, "{mismatched}/{total} elements outside tolerance"),
            Self::ExecutionError { message } => write!(f, "execution failed: {message}"),
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms} ms"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(ComparisonFailure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Divergence of a candidate output from the reference.
///
/// Differences involving NaN count as infinite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivergenceMetrics {
    pub max_abs_diff: f32,
    pub max_rel_diff: f32,
    /// Flat index of the largest absolute difference.
    pub worst_index: Option<usize>,
    /// Elements outside tolerance.
    pub mismatched: usize,
    pub total: usize,
    pub cosine_similarity: f32,
    pub l2_distance: f32,
}

/// Outcome for one representation.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub kind: RepresentationKind,
    /// `None` when the representation produced nothing.
    pub output: Option<Tensor>,
    pub verdict: Verdict,
    pub metrics: Option<DivergenceMetrics>,
}

impl ComparisonResult {
    pub fn failed(kind: RepresentationKind, failure: ComparisonFailure) -> Self {
        Self { kind, output: None, verdict: Verdict::Fail(failure), metrics: None }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Compare `candidate` against `reference` under `tolerance`.
pub fn compare_outputs(
    kind: RepresentationKind,
    reference: &Tensor,
    candidate: Tensor,
    tolerance: Tolerance,
) -> ComparisonResult {
    if candidate.shape() != reference.shape() {
        let failure =
            ComparisonFailure::ShapeMismatch { expected: reference.shape().to_vec(), actual: candidate.shape().to_vec() };
        return ComparisonResult { kind, output: Some(candidate), verdict: Verdict::Fail(failure), metrics: None };
    }

    let expected = reference.to_f32_vec();
    let actual = candidate.to_f32_vec();
    let metrics = divergence(&expected, &actual, tolerance);
    let verdict = if metrics.mismatched == 0 {
        Verdict::Pass
    } else {
        Verdict::Fail(ComparisonFailure::Tolerance { mismatched: metrics.mismatched, total: metrics.total })
    };
    ComparisonResult { kind, output: Some(candidate), verdict, metrics: Some(metrics) }
}

fn divergence(expected: &[f32], actual: &[f32], tolerance: Tolerance) -> DivergenceMetrics {
    let mut metrics = DivergenceMetrics {
        total: expected.len(),
        cosine_similarity: cosine_similarity(actual, expected),
        l2_distance: l2_distance(actual, expected),
        ..Default::default()
    };

    for (i, (&a, &b)) in actual.iter().zip(expected).enumerate() {
        let abs = if a.is_nan() || b.is_nan() {
            f32::INFINITY
        } else if a == b {
            0.0
        } else {
            (a - b).abs()
        };
        let rel = if abs == 0.0 { 0.0 } else { abs / b.abs() };

        if !tolerance.is_close(a, b) {
            metrics.mismatched += 1;
        }
        if metrics.worst_index.is_none() || abs > metrics.max_abs_diff {
            metrics.max_abs_diff = abs;
            metrics.worst_index = Some(i);
        }
        metrics.max_rel_diff = metrics.max_rel_diff.max(rel);
    }
    metrics
}

/// 1.0 for parallel vectors, 0.0 for orthogonal or zero vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a * norm_b)
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}
