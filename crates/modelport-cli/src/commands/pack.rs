//! Build an archive from raw little-endian tensor files.

use crate::exit::EXIT_SUCCESS;
use anyhow::{Context, Result, bail};
use clap::Args;
use modelport_archive::ArchiveWriter;
use modelport_common::{DType, Tensor, parse_shape};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// One `--tensor key=path:dtype:shape` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSource {
    pub key: String,
    pub path: PathBuf,
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl FromStr for TensorSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, rest) = s.split_once('=').ok_or_else(|| format!("expected key=path:dtype:shape, got `{s}`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty key in `{s}`"));
        }
        // dtype and shape never contain ':', the path might
        let mut parts = rest.rsplitn(3, ':');
        let (Some(shape), Some(dtype), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected key=path:dtype:shape, got `{s}`"));
        };
        if path.is_empty() {
            return Err(format!("empty path in `{s}`"));
        }
        let dtype = dtype.parse::<DType>().map_err(|e| e.to_string())?;
        let shape = parse_shape(shape)?;
        Ok(Self { key: key.to_string(), path: PathBuf::from(path), dtype, shape })
    }
}

/// Pack command arguments
#[derive(Args, Debug)]
pub struct PackCommand {
    /// Archive to create
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// Tensor to add, as key=path:dtype:shape (e.g. linear.weight=w.raw:float32:10x10)
    #[arg(long = "tensor", value_name = "SPEC", required = true)]
    pub tensors: Vec<TensorSource>,
}

impl PackCommand {
    pub fn execute(&self) -> Result<i32> {
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let mut writer = ArchiveWriter::create(&self.output)?;
        for source in &self.tensors {
            let bytes =
                std::fs::read(&source.path).with_context(|| format!("cannot read {}", source.path.display()))?;
            let tensor = Tensor::from_bytes(source.dtype, source.shape.clone(), bytes)
                .with_context(|| format!("tensor `{}` from {}", source.key, source.path.display()))?;
            debug!(key = %source.key, shape = ?source.shape, dtype = %source.dtype, "adding tensor");
            writer.write_tensor(&source.key, &tensor)?;
        }

        if writer.is_empty() {
            bail!("no tensors to pack");
        }
        let count = writer.len();
        let path = writer.finish()?;
        info!(path = %path.display(), entries = count, "archive written");
        println!("wrote {count} tensors to {}", path.display());
        Ok(EXIT_SUCCESS)
    }
}
