//! Reconstruct, export and verify a model end to end.

use crate::exit::{EXIT_DIVERGED, EXIT_GENERIC_FAIL, EXIT_SUCCESS};
use crate::output::{OutputFormat, ReceiptTable};
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use modelport_common::{ConfigError, PortConfig, parse_representations, parse_shape};
use modelport_crossval::{PipelineReport, run_pipeline};
use modelport_export::default_exporters;
use modelport_models::ModelSkeleton;
use std::path::PathBuf;
use tracing::{info, warn};

/// Verify command arguments
#[derive(Args, Debug, Default)]
pub struct VerifyCommand {
    /// Parameter archive
    #[arg(long, value_name = "PATH")]
    pub archive: PathBuf,

    /// Model skeleton (TOML or JSON)
    #[arg(long, value_name = "PATH")]
    pub skeleton: PathBuf,

    /// Directory for exported artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Absolute tolerance
    #[arg(long)]
    pub atol: Option<f64>,

    /// Relative tolerance
    #[arg(long)]
    pub rtol: Option<f64>,

    /// Seed for the sample input
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sample input shape, e.g. 1,10
    #[arg(long, value_name = "DIMS")]
    pub sample_shape: Option<String>,

    /// Per-representation export/run timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Representations to verify, e.g. trace,graph
    #[arg(long, value_name = "LIST")]
    pub only: Option<String>,

    /// Write a JSON parity receipt to this path
    #[arg(long, value_name = "PATH")]
    pub receipt: Option<PathBuf>,

    /// Print the receipt as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl VerifyCommand {
    /// Apply command-line flags on top of `config`.
    pub fn apply_overrides(&self, config: &mut PortConfig) -> Result<(), ConfigError> {
        if let Some(atol) = self.atol {
            config.harness.atol = atol;
        }
        if let Some(rtol) = self.rtol {
            config.harness.rtol = rtol;
        }
        if let Some(seed) = self.seed {
            config.harness.seed = seed;
        }
        if let Some(shape) = &self.sample_shape {
            config.harness.sample_shape = parse_shape(shape).map_err(|reason| ConfigError::InvalidValue {
                key: "--sample-shape".into(),
                value: shape.clone(),
                reason,
            })?;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.harness.timeout_ms = timeout_ms;
        }
        if let Some(only) = &self.only {
            config.export.representations = parse_representations(only).map_err(|reason| {
                ConfigError::InvalidValue { key: "--only".into(), value: only.clone(), reason }
            })?;
        }
        if let Some(out_dir) = &self.out_dir {
            config.export.out_dir = out_dir.clone();
        }
        config.validate()
    }

    pub async fn execute(&self, mut config: PortConfig) -> Result<i32> {
        self.apply_overrides(&mut config)?;
        let skeleton = ModelSkeleton::from_file(&self.skeleton)?;
        let exporters = default_exporters(&config.export.representations);

        info!(
            archive = %self.archive.display(),
            skeleton = %self.skeleton.display(),
            representations = ?config.export.representations,
            "verifying"
        );
        let mut report = run_pipeline(&self.archive, &skeleton, &config, exporters).await?;
        report.receipt.set_skeleton(&self.skeleton.display().to_string());

        if let Some(path) = &self.receipt {
            report
                .receipt
                .write_to_file(path)
                .with_context(|| format!("cannot write receipt {}", path.display()))?;
            info!(path = %path.display(), "receipt written");
        }

        match OutputFormat::from_json_flag(self.json) {
            OutputFormat::Json => println!("{}", report.receipt.to_json()?),
            OutputFormat::Text => print!("{}", ReceiptTable(&report.receipt)),
        }

        Ok(Self::exit_code(&report))
    }

    fn exit_code(report: &PipelineReport) -> i32 {
        let summary = &report.receipt.summary;
        if !summary.diverged.is_empty() {
            for result in report.diverged() {
                warn!(stage = %result.kind, "representation diverged");
            }
            return EXIT_DIVERGED;
        }
        if summary.compared == 0 {
            eprintln!("{} no representation could be exported", style("error:").red().bold());
            return EXIT_GENERIC_FAIL;
        }
        EXIT_SUCCESS
    }
}
