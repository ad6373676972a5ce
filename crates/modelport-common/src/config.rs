//! Configuration types and utilities
//!
//! Precedence, lowest to highest: built-in defaults, config file (TOML or
//! JSON), `MODELPORT_*` environment variables, then command-line flags (which
//! callers apply with [`PortConfig::merge_with`] or by direct assignment).

use crate::error::ConfigError;
use crate::types::RepresentationKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Top-level modelport configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub archive: ArchiveConfig,
    pub harness: HarnessConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// How entry bytes travel from the container to the tensor buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Copy straight from the container stream.
    #[default]
    Memory,
    /// Stream into a scoped temporary file, map it, copy out, delete it.
    TempFile,
}

impl StagingMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "tempfile" | "temp" | "file" => Some(Self::TempFile),
            _ => None,
        }
    }
}

/// Archive reader configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub staging: StagingMode,
    /// Directory for temp-file staging; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

/// Equivalence harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub atol: f64,
    pub rtol: f64,
    pub seed: u64,
    pub sample_shape: Vec<usize>,
    /// Per-collaborator timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { atol: 1e-5, rtol: 1e-3, seed: 0, sample_shape: vec![10], timeout_ms: 30_000 }
    }
}

/// Representation export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub out_dir: PathBuf,
    pub representations: Vec<RepresentationKind>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { out_dir: PathBuf::from("modelport-out"), representations: RepresentationKind::ALL.to_vec() }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl PortConfig {
    /// Load configuration from a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let config: Self = match ext.as_deref() {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), reason: e.to_string() })?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), reason: e.to_string() })?,
            _ => return Err(ConfigError::UnsupportedExtension { path: path.to_path_buf() }),
        };

        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MODELPORT_*` environment variables on top of this config.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("MODELPORT_ATOL") {
            self.harness.atol = parse_value("MODELPORT_ATOL", &v)?;
        }
        if let Some(v) = env_var("MODELPORT_RTOL") {
            self.harness.rtol = parse_value("MODELPORT_RTOL", &v)?;
        }
        if let Some(v) = env_var("MODELPORT_SEED") {
            self.harness.seed = parse_value("MODELPORT_SEED", &v)?;
        }
        if let Some(v) = env_var("MODELPORT_SAMPLE_SHAPE") {
            self.harness.sample_shape = parse_shape(&v).map_err(|reason| ConfigError::InvalidValue {
                key: "MODELPORT_SAMPLE_SHAPE".into(),
                value: v.clone(),
                reason,
            })?;
        }
        if let Some(v) = env_var("MODELPORT_TIMEOUT_MS") {
            self.harness.timeout_ms = parse_value("MODELPORT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = env_var("MODELPORT_STAGING") {
            self.archive.staging = StagingMode::from_name(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: "MODELPORT_STAGING".into(),
                value: v.clone(),
                reason: "expected `memory` or `tempfile`".into(),
            })?;
        }
        if let Some(v) = env_var("MODELPORT_OUT_DIR") {
            self.export.out_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("MODELPORT_REPRESENTATIONS") {
            self.export.representations = parse_representations(&v).map_err(|reason| {
                ConfigError::InvalidValue { key: "MODELPORT_REPRESENTATIONS".into(), value: v.clone(), reason }
            })?;
        }
        if let Some(v) = env_var("MODELPORT_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_var("MODELPORT_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Override every field of `self` that `other` sets to a non-default value.
    pub fn merge_with(&mut self, other: PortConfig) {
        let defaults = PortConfig::default();

        if other.archive.staging != defaults.archive.staging {
            self.archive.staging = other.archive.staging;
        }
        if other.archive.staging_dir.is_some() {
            self.archive.staging_dir = other.archive.staging_dir;
        }

        if other.harness.atol != defaults.harness.atol {
            self.harness.atol = other.harness.atol;
        }
        if other.harness.rtol != defaults.harness.rtol {
            self.harness.rtol = other.harness.rtol;
        }
        if other.harness.seed != defaults.harness.seed {
            self.harness.seed = other.harness.seed;
        }
        if other.harness.sample_shape != defaults.harness.sample_shape {
            self.harness.sample_shape = other.harness.sample_shape;
        }
        if other.harness.timeout_ms != defaults.harness.timeout_ms {
            self.harness.timeout_ms = other.harness.timeout_ms;
        }

        if other.export.out_dir != defaults.export.out_dir {
            self.export.out_dir = other.export.out_dir;
        }
        if other.export.representations != defaults.export.representations {
            self.export.representations = other.export.representations;
        }

        if other.logging.level != defaults.logging.level {
            self.logging.level = other.logging.level;
        }
        if other.logging.format != defaults.logging.format {
            self.logging.format = other.logging.format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.harness;
        if !h.atol.is_finite() || h.atol < 0.0 {
            return Err(ConfigError::Validation(format!("atol must be finite and >= 0, got {}", h.atol)));
        }
        if !h.rtol.is_finite() || h.rtol < 0.0 {
            return Err(ConfigError::Validation(format!("rtol must be finite and >= 0, got {}", h.rtol)));
        }
        if h.sample_shape.is_empty() || h.sample_shape.contains(&0) {
            return Err(ConfigError::Validation(format!(
                "sample_shape must be non-empty with positive dimensions, got {:?}",
                h.sample_shape
            )));
        }
        if h.timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms must be greater than 0".into()));
        }
        if self.export.representations.is_empty() {
            return Err(ConfigError::Validation("at least one representation must be enabled".into()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            return Err(ConfigError::Validation(format!(
                "log format must be pretty, compact or json, got `{}`",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Loads configuration honouring defaults < file < environment.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_with_precedence(path: Option<&Path>) -> Result<PortConfig, ConfigError> {
        let mut config = match path {
            Some(p) => PortConfig::from_file(p)?,
            None => PortConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a comma or `x` separated shape such as `1,10` or `1x10`.
pub fn parse_shape(s: &str) -> Result<Vec<usize>, String> {
    let dims = s
        .split([',', 'x'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<usize>().map_err(|e| format!("bad dimension `{p}`: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    if dims.is_empty() {
        return Err("shape has no dimensions".into());
    }
    if dims.contains(&0) {
        return Err("dimensions must be positive".into());
    }
    Ok(dims)
}

/// Parse a comma separated list of representation names.
pub fn parse_representations(s: &str) -> Result<Vec<RepresentationKind>, String> {
    let mut kinds = Vec::new();
    for name in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = RepresentationKind::from_name(name).ok_or_else(|| format!("unknown representation `{name}`"))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err("no representations listed".into());
    }
    Ok(kinds)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
