//! The equivalence harness
//!
//! Per run: `Start -> ReferenceComputed -> {Pending -> Compared}* -> Done`.
//! Each representation is run and compared in its own blocking task; the
//! results are joined, so one slow or failing representation never hides
//! the others.

use crate::compare::{ComparisonFailure, ComparisonResult, Verdict, compare_outputs};
use crate::tolerance::Tolerance;
use futures::future::join_all;
use modelport_common::{HarnessConfig, ModelError, Tensor};
use modelport_export::Representation;
use modelport_models::Model;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum HarnessError {
    /// The model's own forward pass failed; nothing can be compared.
    #[error("reference forward pass failed: {0}")]
    Reference(#[from] ModelError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("harness thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy)]
pub struct EquivalenceHarness {
    tolerance: Tolerance,
    timeout: Duration,
}

impl Default for EquivalenceHarness {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl EquivalenceHarness {
    pub fn new(tolerance: Tolerance, timeout: Duration) -> Self {
        Self { tolerance, timeout }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(Tolerance::from_config(config), Duration::from_millis(config.timeout_ms))
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Compare every representation against `model` on `sample`.
    ///
    /// Returns one result per representation, in input order. Only a failure
    /// of the reference forward pass is an error.
    pub async fn verify(
        &self,
        model: &Model,
        representations: &[Representation],
        sample: &Tensor,
    ) -> Result<Vec<ComparisonResult>, HarnessError> {
        debug!(state = "start", representations = representations.len());
        let reference = Arc::new(model.forward(sample)?);
        debug!(state = "reference_computed", shape = ?reference.shape());

        let tasks = representations.iter().map(|rep| {
            let rep = rep.clone();
            let sample = sample.clone();
            let reference = Arc::clone(&reference);
            let (tolerance, timeout) = (self.tolerance, self.timeout);
            async move {
                let kind = rep.kind();
                debug!(state = "pending", representation = %kind);
                let handle = tokio::task::spawn_blocking(move || rep.run(&sample));
                let result = match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(Ok(output))) => compare_outputs(kind, &reference, output, tolerance),
                    Ok(Ok(Err(e))) => {
                        ComparisonResult::failed(kind, ComparisonFailure::ExecutionError { message: format!("{e:#}") })
                    }
                    Ok(Err(join)) => ComparisonResult::failed(
                        kind,
                        ComparisonFailure::ExecutionError { message: format!("runner task failed: {join}") },
                    ),
                    Err(_) => ComparisonResult::failed(
                        kind,
                        ComparisonFailure::Timeout { after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) },
                    ),
                };
                debug!(state = "compared", representation = %kind, pass = result.is_pass());
                result
            }
        });

        let results = join_all(tasks).await;
        for result in &results {
            match (&result.verdict, &result.metrics) {
                (Verdict::Pass, m) => info!(
                    representation = %result.kind,
                    max_abs_diff = m.as_ref().map_or(0.0, |m| m.max_abs_diff),
                    "representation equivalent"
                ),
                (Verdict::Fail(failure), _) => {
                    warn!(representation = %result.kind, %failure, "representation diverged")
                }
            }
        }
        debug!(state = "done", passed = results.iter().filter(|r| r.is_pass()).count(), total = results.len());
        Ok(results)
    }

    /// Blocking form of [`verify`](Self::verify).
    ///
    /// Runs on a private runtime. Inside an existing runtime that runtime
    /// lives on a scoped thread, and the calling thread waits for it.
    /// Representations that timed out are detached, so this returns once the
    /// timeout elapses even if a runner never finishes.
    pub fn verify_blocking(
        &self,
        model: &Model,
        representations: &[Representation],
        sample: &Tensor,
    ) -> Result<Vec<ComparisonResult>, HarnessError> {
        let run = || -> Result<Vec<ComparisonResult>, HarnessError> {
            let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            let results = rt.block_on(self.verify(model, representations, sample));
            rt.shutdown_background();
            results
        };

        match tokio::runtime::Handle::try_current() {
            Ok(_) => std::thread::scope(|s| s.spawn(run).join().map_err(|_| HarnessError::Panicked))?,
            Err(_) => run(),
        }
    }
}
