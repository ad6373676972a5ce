//! Declarative model skeletons
//!
//! A [`ModelSkeleton`] lists layers in execution order together with the
//! archive entries that fill their parameter slots. Reconstruction fills the
//! declared slots and nothing else.

use modelport_common::{DType, ModelError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Layer kinds a skeleton may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Linear {
        in_features: usize,
        out_features: usize,
        #[serde(default = "default_true")]
        bias: bool,
    },
    Relu,
    Sigmoid,
    Tanh,
    Flatten,
}

fn default_true() -> bool {
    true
}

fn default_dtype() -> String {
    DType::Float32.as_str().to_string()
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear { .. } => "linear",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Flatten => "flatten",
        }
    }

    /// Parameter slots this kind owns and the shape each must have.
    pub fn expected_params(&self) -> Vec<(&'static str, Vec<usize>)> {
        match *self {
            Self::Linear { in_features, out_features, bias } => {
                let mut slots = vec![("weight", vec![out_features, in_features])];
                if bias {
                    slots.push(("bias", vec![out_features]));
                }
                slots
            }
            _ => Vec::new(),
        }
    }
}

/// One parameter slot and the archive entry that fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub slot: String,
    pub key: String,
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
    #[serde(default = "default_true")]
    pub requires_grad: bool,
}

impl ParamSpec {
    pub fn new(slot: impl Into<String>, key: impl Into<String>, shape: Vec<usize>) -> Self {
        Self { slot: slot.into(), key: key.into(), shape, dtype: default_dtype(), requires_grad: true }
    }

    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = dtype.into();
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Explicit slot bindings. When empty, slots are derived from the kind
    /// with keys `<name>.<slot>` and float32 storage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self { name: name.into(), kind, params: Vec::new() }
    }

    /// Declared slot bindings, or the derived defaults when none are given.
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        if !self.params.is_empty() {
            return self.params.clone();
        }
        self.kind
            .expected_params()
            .into_iter()
            .map(|(slot, shape)| ParamSpec::new(slot, format!("{}.{slot}", self.name), shape))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSkeleton {
    pub layers: Vec<LayerSpec>,
}

impl ModelSkeleton {
    pub fn builder() -> SkeletonBuilder {
        SkeletonBuilder::default()
    }

    /// Load a skeleton from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Skeleton(format!("cannot read {}: {e}", path.display())))?;
        let parsed = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| e.to_string()),
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => {
                return Err(ModelError::Skeleton(format!(
                    "unsupported skeleton extension for {} (expected .toml or .json)",
                    path.display()
                )));
            }
        };
        let skeleton: Self =
            parsed.map_err(|reason| ModelError::Skeleton(format!("cannot parse {}: {reason}", path.display())))?;
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|e| ModelError::Skeleton(e.to_string()))
    }

    /// Checks that do not need the archive: non-empty, unique non-empty layer
    /// names, positive linear dimensions.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::Skeleton("skeleton declares no layers".into()));
        }
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                return Err(ModelError::Skeleton("layer name must not be empty".into()));
            }
            if !seen.insert(layer.name.as_str()) {
                return Err(ModelError::Skeleton(format!("duplicate layer name `{}`", layer.name)));
            }
            if let LayerKind::Linear { in_features, out_features, .. } = layer.kind
                && (in_features == 0 || out_features == 0)
            {
                return Err(ModelError::Skeleton(format!(
                    "linear layer `{}` needs positive dimensions, got {in_features}x{out_features}",
                    layer.name
                )));
            }
        }
        Ok(())
    }

    /// All archive keys the skeleton reads, in reconstruction order.
    pub fn keys(&self) -> Vec<String> {
        self.layers.iter().flat_map(|l| l.param_specs().into_iter().map(|p| p.key)).collect()
    }
}

/// Builds a skeleton with derived `<layer>.<slot>` keys.
///
/// ```
/// use modelport_models::ModelSkeleton;
///
/// let skeleton = ModelSkeleton::builder().linear("linear", 10, 10, true).relu("relu").build();
/// assert_eq!(skeleton.keys(), ["linear.weight", "linear.bias"]);
/// ```
#[derive(Debug, Default)]
pub struct SkeletonBuilder {
    layers: Vec<LayerSpec>,
}

impl SkeletonBuilder {
    pub fn layer(mut self, name: impl Into<String>, kind: LayerKind) -> Self {
        let mut spec = LayerSpec::new(name, kind);
        spec.params = spec.param_specs();
        self.layers.push(spec);
        self
    }

    pub fn linear(self, name: impl Into<String>, in_features: usize, out_features: usize, bias: bool) -> Self {
        self.layer(name, LayerKind::Linear { in_features, out_features, bias })
    }

    pub fn relu(self, name: impl Into<String>) -> Self {
        self.layer(name, LayerKind::Relu)
    }

    pub fn sigmoid(self, name: impl Into<String>) -> Self {
        self.layer(name, LayerKind::Sigmoid)
    }

    pub fn tanh(self, name: impl Into<String>) -> Self {
        self.layer(name, LayerKind::Tanh)
    }

    pub fn flatten(self, name: impl Into<String>) -> Self {
        self.layer(name, LayerKind::Flatten)
    }

    pub fn build(self) -> ModelSkeleton {
        ModelSkeleton { layers: self.layers }
    }
}
