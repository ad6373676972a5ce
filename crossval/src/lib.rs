//! Cross-representation equivalence checking
//!
//! Runs one fixed, seeded input through a reconstructed [`Model`] and through
//! every exported representation, then compares each output against the
//! model's own under an absolute plus relative tolerance.
//!
//! [`Model`]: modelport_models::Model

pub mod compare;
pub mod harness;
pub mod pipeline;
pub mod receipt;
pub mod tolerance;

pub use compare::{ComparisonFailure, ComparisonResult, DivergenceMetrics, Verdict, compare_outputs};
pub use harness::{EquivalenceHarness, HarnessError};
pub use pipeline::{PipelineError, PipelineReport, run_pipeline};
pub use receipt::ParityReceipt;
pub use tolerance::Tolerance;
