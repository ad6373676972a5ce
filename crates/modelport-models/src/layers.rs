//! Inference-ready layers and the reference forward pass.

use candle_core::Tensor as CandleTensor;
use modelport_common::{ModelError, Tensor};
use tracing::debug;

/// A tensor bound to a model slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub tensor: Tensor,
    /// Carried for representation fidelity; inference ignores it.
    pub requires_grad: bool,
}

impl Parameter {
    pub fn new(tensor: Tensor) -> Self {
        Self { tensor, requires_grad: true }
    }
}

/// Fully connected layer computing `x · Wᵀ + b`, with `W` of shape `[out, in]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Parameter,
    pub bias: Option<Parameter>,
}

impl Linear {
    pub fn new(weight: Parameter, bias: Option<Parameter>) -> Result<Self, ModelError> {
        let &[out_features, in_features] = weight.tensor.shape() else {
            return Err(ModelError::Skeleton(format!(
                "linear weight must be rank 2, got shape {:?}",
                weight.tensor.shape()
            )));
        };
        if let Some(b) = &bias
            && b.tensor.shape() != [out_features]
        {
            return Err(ModelError::Skeleton(format!(
                "linear bias must have shape [{out_features}], got {:?}",
                b.tensor.shape()
            )));
        }
        Ok(Self { in_features, out_features, weight, bias })
    }

    fn forward(&self, x: &CandleTensor) -> candle_core::Result<CandleTensor> {
        let w = self.weight.tensor.to_candle().map_err(candle_core::Error::wrap)?;
        let y = x.matmul(&w.t()?)?;
        match &self.bias {
            Some(b) => {
                let b = b.tensor.to_candle().map_err(candle_core::Error::wrap)?;
                y.broadcast_add(&b)
            }
            None => Ok(y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Linear(Linear),
    Relu,
    Sigmoid,
    Tanh,
    /// Collapses every dimension after the first.
    Flatten,
}

impl Layer {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Flatten => "flatten",
        }
    }

    /// `(slot, parameter)` pairs in declaration order.
    pub fn parameters(&self) -> Vec<(&'static str, &Parameter)> {
        match self {
            Self::Linear(l) => {
                let mut params = vec![("weight", &l.weight)];
                if let Some(b) = &l.bias {
                    params.push(("bias", b));
                }
                params
            }
            _ => Vec::new(),
        }
    }

    fn forward(&self, x: &CandleTensor) -> candle_core::Result<CandleTensor> {
        match self {
            Self::Linear(l) => l.forward(x),
            Self::Relu => x.relu(),
            Self::Sigmoid => x.neg()?.exp()?.affine(1.0, 1.0)?.recip(),
            Self::Tanh => x.tanh(),
            Self::Flatten => x.flatten_from(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedLayer {
    pub name: String,
    pub layer: Layer,
}

/// Ordered sequence of layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    layers: Vec<NamedLayer>,
}

impl Model {
    pub fn new(layers: Vec<NamedLayer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[NamedLayer] {
        &self.layers
    }

    /// `(qualified name, parameter)` pairs, e.g. `("linear.weight", ..)`.
    pub fn parameters(&self) -> impl Iterator<Item = (String, &Parameter)> {
        self.layers.iter().flat_map(|named| {
            named.layer.parameters().into_iter().map(move |(slot, p)| (format!("{}.{slot}", named.name), p))
        })
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters().map(|(_, p)| p.tensor.numel()).sum()
    }

    /// Run the layers in order. A rank-1 input is treated as a single row
    /// and the row dimension is dropped again from the output.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let mut x = input.to_candle()?;
        let single_row = x.rank() == 1;
        if single_row {
            x = x.unsqueeze(0).map_err(|e| forward_err("input", e))?;
        }

        for named in &self.layers {
            x = named.layer.forward(&x).map_err(|e| forward_err(&named.name, e))?;
            debug!(layer = %named.name, kind = named.layer.kind_name(), shape = ?x.dims(), "forward");
        }

        if single_row && x.rank() == 2 && x.dim(0).is_ok_and(|d| d == 1) {
            x = x.squeeze(0).map_err(|e| forward_err("output", e))?;
        }
        Ok(Tensor::from_candle(&x)?)
    }
}

fn forward_err(layer: &str, e: candle_core::Error) -> ModelError {
    ModelError::Forward { layer: layer.to_string(), reason: e.to_string() }
}
