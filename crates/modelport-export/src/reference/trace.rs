//! Trace collaborator: a JSON layer program with inlined parameters,
//! replayed through the candle-backed layer stack.

use crate::collaborators::TraceEngine;
use anyhow::{Context, bail, ensure};
use modelport_common::Tensor;
use modelport_models::{Layer, Linear, Model, NamedLayer, Parameter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const TRACE_FORMAT: &str = "modelport-trace";
const TRACE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceProgram {
    pub format: String,
    pub version: u32,
    /// Traces are specialized to the shape they were captured with.
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
    pub ops: Vec<TraceOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceOp {
    Linear {
        name: String,
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Option<Vec<f32>>,
        weight_requires_grad: bool,
        #[serde(default = "default_requires_grad")]
        bias_requires_grad: bool,
    },
    Relu { name: String },
    Sigmoid { name: String },
    Tanh { name: String },
    Flatten { name: String },
}

fn default_requires_grad() -> bool {
    true
}

impl TraceProgram {
    pub fn capture(model: &Model, input_shape: &[usize], output_shape: &[usize]) -> Self {
        let ops = model
            .layers()
            .iter()
            .map(|NamedLayer { name, layer }| {
                let name = name.clone();
                match layer {
                    Layer::Linear(l) => TraceOp::Linear {
                        name,
                        in_features: l.in_features,
                        out_features: l.out_features,
                        weight: l.weight.tensor.to_f32_vec(),
                        bias: l.bias.as_ref().map(|b| b.tensor.to_f32_vec()),
                        weight_requires_grad: l.weight.requires_grad,
                        bias_requires_grad: l.bias.as_ref().is_none_or(|b| b.requires_grad),
                    },
                    Layer::Relu => TraceOp::Relu { name },
                    Layer::Sigmoid => TraceOp::Sigmoid { name },
                    Layer::Tanh => TraceOp::Tanh { name },
                    Layer::Flatten => TraceOp::Flatten { name },
                }
            })
            .collect();
        Self {
            format: TRACE_FORMAT.into(),
            version: TRACE_VERSION,
            input_shape: input_shape.to_vec(),
            output_shape: output_shape.to_vec(),
            ops,
        }
    }

    pub fn to_model(&self) -> anyhow::Result<Model> {
        let mut layers = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let (name, layer) = match op {
                TraceOp::Linear {
                    name,
                    in_features,
                    out_features,
                    weight,
                    bias,
                    weight_requires_grad,
                    bias_requires_grad,
                } => {
                    let weight = Parameter {
                        tensor: Tensor::from_f32(vec![*out_features, *in_features], weight)
                            .with_context(|| format!("weight of `{name}`"))?,
                        requires_grad: *weight_requires_grad,
                    };
                    let bias = match bias {
                        Some(b) => Some(Parameter {
                            tensor: Tensor::from_f32(vec![*out_features], b)
                                .with_context(|| format!("bias of `{name}`"))?,
                            requires_grad: *bias_requires_grad,
                        }),
                        None => None,
                    };
                    (name, Layer::Linear(Linear::new(weight, bias)?))
                }
                TraceOp::Relu { name } => (name, Layer::Relu),
                TraceOp::Sigmoid { name } => (name, Layer::Sigmoid),
                TraceOp::Tanh { name } => (name, Layer::Tanh),
                TraceOp::Flatten { name } => (name, Layer::Flatten),
            };
            layers.push(NamedLayer { name: name.clone(), layer });
        }
        Ok(Model::new(layers))
    }
}

/// Writes [`TraceProgram`]s as JSON and replays them.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTraceEngine;

impl TraceEngine for JsonTraceEngine {
    fn trace(&self, model: &Model, sample: &Tensor, out: &Path) -> anyhow::Result<PathBuf> {
        let traced = model.forward(sample).context("forward pass while tracing")?;
        let program = TraceProgram::capture(model, sample.shape(), traced.shape());

        let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &program).context("serializing trace")?;
        writer.flush()?;
        Ok(out.to_path_buf())
    }

    fn replay(&self, artifact: &Path, input: &Tensor) -> anyhow::Result<Tensor> {
        let file = File::open(artifact).with_context(|| format!("opening {}", artifact.display()))?;
        let program: TraceProgram =
            serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", artifact.display()))?;
        if program.format != TRACE_FORMAT || program.version != TRACE_VERSION {
            bail!("not a {TRACE_FORMAT} v{TRACE_VERSION} program: {} v{}", program.format, program.version);
        }
        ensure!(
            input.shape() == program.input_shape,
            "trace was captured for input shape {:?}, got {:?}",
            program.input_shape,
            input.shape()
        );

        let output = program.to_model()?.forward(input).context("replaying trace")?;
        ensure!(
            output.shape() == program.output_shape,
            "replay produced shape {:?}, trace recorded {:?}",
            output.shape(),
            program.output_shape
        );
        Ok(output)
    }
}
