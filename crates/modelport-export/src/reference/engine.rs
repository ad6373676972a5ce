//! Inference-engine collaborator: a text `.param` structure file plus a raw
//! `.bin` weight file, executed with scalar f32 kernels.
//!
//! ```text
//! 7767517
//! 3 3
//! Input        in0     0 1 in0 0=10
//! InnerProduct linear  1 1 in0 1 0=10 1=1 2=100
//! ReLU         relu    1 1 1 out0
//! ```
//!
//! Layer lines are `type name n_in n_out inputs.. outputs.. k=v..`. In the
//! weight file each InnerProduct contributes a 4-byte zero tag, the row-major
//! `[out, in]` weight, then the bias when `1=1`, all little-endian f32.

use crate::collaborators::{EngineArtifacts, EngineCompiler};
use anyhow::{Context, anyhow, bail, ensure};
use modelport_common::Tensor;
use modelport_models::{Layer, Model};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const PARAM_MAGIC: u32 = 7_767_517;
const RAW_F32_TAG: u32 = 0;

#[derive(Debug, Clone, PartialEq)]
struct LayerLine {
    kind: String,
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    params: HashMap<u32, i64>,
}

impl LayerLine {
    fn param(&self, id: u32) -> anyhow::Result<i64> {
        self.params.get(&id).copied().ok_or_else(|| anyhow!("layer `{}` is missing param {id}", self.name))
    }

    fn param_usize(&self, id: u32) -> anyhow::Result<usize> {
        usize::try_from(self.param(id)?).map_err(|_| anyhow!("layer `{}` param {id} is negative", self.name))
    }
}

fn parse_param(text: &str) -> anyhow::Result<Vec<LayerLine>> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let magic: u32 = lines.next().ok_or_else(|| anyhow!("empty param file"))?.parse().context("magic")?;
    ensure!(magic == PARAM_MAGIC, "bad param magic {magic}");

    let counts = lines.next().ok_or_else(|| anyhow!("missing layer/blob count line"))?;
    let (layer_count, _blob_count) = counts
        .split_once(char::is_whitespace)
        .map(|(l, b)| (l.trim().parse::<usize>(), b.trim().parse::<usize>()))
        .ok_or_else(|| anyhow!("malformed count line `{counts}`"))?;
    let layer_count = layer_count.context("layer count")?;

    let mut layers = Vec::with_capacity(layer_count);
    for line in lines {
        let mut tok = line.split_whitespace();
        let mut next = |what: &str| tok.next().ok_or_else(|| anyhow!("truncated layer line `{line}`: no {what}"));
        let kind = next("type")?.to_string();
        let name = next("name")?.to_string();
        let n_in: usize = next("input count")?.parse().context("input count")?;
        let n_out: usize = next("output count")?.parse().context("output count")?;
        let inputs = (0..n_in).map(|_| next("input blob").map(str::to_string)).collect::<anyhow::Result<_>>()?;
        let outputs = (0..n_out).map(|_| next("output blob").map(str::to_string)).collect::<anyhow::Result<_>>()?;

        let mut params = HashMap::new();
        for kv in tok {
            let (k, v) = kv.split_once('=').ok_or_else(|| anyhow!("bad param `{kv}` in `{line}`"))?;
            let id: u32 = k.parse().with_context(|| format!("param id `{k}`"))?;
            let value: i64 = v.parse().with_context(|| format!("param value `{v}`"))?;
            params.insert(id, value);
        }
        layers.push(LayerLine { kind, name, inputs, outputs, params });
    }
    ensure!(layers.len() == layer_count, "param declares {layer_count} layers, found {}", layers.len());
    Ok(layers)
}

/// Little-endian f32 cursor over the weight file.
struct WeightReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WeightReader<'a> {
    fn take(&mut self, n: usize, what: &str) -> anyhow::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        let end = end.ok_or_else(|| anyhow!("weight file ends inside {what} at byte {}", self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> anyhow::Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32s(&mut self, count: usize, what: &str) -> anyhow::Result<Vec<f32>> {
        let bytes = self.take(count.checked_mul(4).ok_or_else(|| anyhow!("{what} too large"))?, what)?;
        Ok(bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
    }
}

/// Blob value: dims as the model sees them plus row-major data.
struct Blob {
    dims: Vec<usize>,
    data: Vec<f32>,
}

fn inner_product(x: &Blob, weight: &[f32], bias: Option<&[f32]>, num_output: usize) -> anyhow::Result<Blob> {
    let rows = if x.dims.len() <= 1 { 1 } else { x.dims[0] };
    let width = x.data.len() / rows.max(1);
    ensure!(width * num_output == weight.len(), "input width {width} does not fit weight of {} values", weight.len());

    let mut out = Vec::with_capacity(rows * num_output);
    for row in x.data.chunks_exact(width) {
        for o in 0..num_output {
            let w = &weight[o * width..(o + 1) * width];
            let mut acc = bias.map_or(0.0, |b| b[o]);
            for (xi, wi) in row.iter().zip(w) {
                acc += xi * wi;
            }
            out.push(acc);
        }
    }
    let dims = if x.dims.len() <= 1 { vec![num_output] } else { vec![rows, num_output] };
    Ok(Blob { dims, data: out })
}

fn run(layers: &[LayerLine], bin: &[u8], input: &Tensor) -> anyhow::Result<Tensor> {
    let mut weights = WeightReader { bytes: bin, pos: 0 };
    let mut blobs: HashMap<&str, Blob> = HashMap::new();
    let mut last_output: Option<&str> = None;

    for layer in layers {
        let out = match layer.kind.as_str() {
            "Input" => Blob { dims: input.shape().to_vec(), data: input.to_f32_vec() },
            kind => {
                let [input_blob] = layer.inputs.as_slice() else { bail!("layer `{}` must have one input", layer.name) };
                let x = blobs
                    .remove(input_blob.as_str())
                    .ok_or_else(|| anyhow!("layer `{}` reads unknown blob `{input_blob}`", layer.name))?;
                match kind {
                    "InnerProduct" => {
                        let num_output = layer.param_usize(0)?;
                        let has_bias = layer.param(1)? != 0;
                        let weight_size = layer.param_usize(2)?;
                        let tag = weights.u32("weight tag")?;
                        ensure!(tag == RAW_F32_TAG, "layer `{}` uses unsupported weight encoding {tag:#x}", layer.name);
                        let w = weights.f32s(weight_size, "weight data")?;
                        let b = if has_bias { Some(weights.f32s(num_output, "bias data")?) } else { None };
                        inner_product(&x, &w, b.as_deref(), num_output).with_context(|| format!("layer `{}`", layer.name))?
                    }
                    "ReLU" => Blob { data: x.data.iter().map(|v| v.max(0.0)).collect(), dims: x.dims },
                    "Sigmoid" => Blob { data: x.data.iter().map(|v| 1.0 / (1.0 + (-v).exp())).collect(), dims: x.dims },
                    "TanH" => Blob { data: x.data.iter().map(|v| v.tanh()).collect(), dims: x.dims },
                    "Flatten" => {
                        let dims = match x.dims.as_slice() {
                            [] | [_] => x.dims.clone(),
                            [d0, rest @ ..] => vec![*d0, rest.iter().product()],
                        };
                        Blob { dims, data: x.data }
                    }
                    other => bail!("unsupported layer type `{other}`"),
                }
            }
        };
        let [output_blob] = layer.outputs.as_slice() else { bail!("layer `{}` must have one output", layer.name) };
        blobs.insert(output_blob.as_str(), out);
        last_output = Some(output_blob.as_str());
    }
    ensure!(weights.pos == bin.len(), "{} trailing bytes in weight file", bin.len() - weights.pos);

    let name = last_output.ok_or_else(|| anyhow!("engine graph has no layers"))?;
    let out = blobs.remove(name).ok_or_else(|| anyhow!("output blob `{name}` missing"))?;
    Ok(Tensor::from_f32(out.dims, &out.data)?)
}

/// Writes `.param`/`.bin` pairs and runs them with its own kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEngineCompiler;

impl TextEngineCompiler {
    fn lower(model: &Model) -> anyhow::Result<(String, Vec<u8>)> {
        let mut body = String::new();
        let mut bin = Vec::new();
        let input_width = model.layers().iter().find_map(|l| match &l.layer {
            Layer::Linear(lin) => Some(lin.in_features),
            _ => None,
        });
        match input_width {
            Some(w) => writeln!(body, "{:<16} {:<16} 0 1 in0 0={w}", "Input", "in0")?,
            None => writeln!(body, "{:<16} {:<16} 0 1 in0", "Input", "in0")?,
        }

        let last = model.layers().len().saturating_sub(1);
        let mut current = "in0".to_string();
        for (i, named) in model.layers().iter().enumerate() {
            let output = if i == last { "out0".to_string() } else { (i + 1).to_string() };
            let (kind, params) = match &named.layer {
                Layer::Linear(l) => {
                    bin.extend_from_slice(&RAW_F32_TAG.to_le_bytes());
                    for v in l.weight.tensor.to_f32_vec() {
                        bin.extend_from_slice(&v.to_le_bytes());
                    }
                    if let Some(b) = &l.bias {
                        for v in b.tensor.to_f32_vec() {
                            bin.extend_from_slice(&v.to_le_bytes());
                        }
                    }
                    let bias_term = u8::from(l.bias.is_some());
                    ("InnerProduct", format!(" 0={} 1={bias_term} 2={}", l.out_features, l.out_features * l.in_features))
                }
                Layer::Relu => ("ReLU", String::new()),
                Layer::Sigmoid => ("Sigmoid", String::new()),
                Layer::Tanh => ("TanH", String::new()),
                Layer::Flatten => ("Flatten", String::new()),
            };
            writeln!(body, "{kind:<16} {:<16} 1 1 {current} {output}{params}", named.name)?;
            current = output;
        }

        let layer_count = model.layers().len() + 1;
        let param = format!("{PARAM_MAGIC}\n{layer_count} {layer_count}\n{body}");
        Ok((param, bin))
    }
}

impl EngineCompiler for TextEngineCompiler {
    fn compile(&self, model: &Model, out: &Path) -> anyhow::Result<EngineArtifacts> {
        let (param_text, bin_bytes) = Self::lower(model)?;
        let param = with_suffix(out, "param");
        let bin = with_suffix(out, "bin");
        fs::write(&param, param_text).with_context(|| format!("writing {}", param.display()))?;
        fs::write(&bin, bin_bytes).with_context(|| format!("writing {}", bin.display()))?;
        Ok(EngineArtifacts { param, bin })
    }

    fn load_and_run(&self, param: &Path, bin: &Path, input: &Tensor) -> anyhow::Result<Tensor> {
        let text = fs::read_to_string(param).with_context(|| format!("reading {}", param.display()))?;
        let layers = parse_param(&text).with_context(|| format!("parsing {}", param.display()))?;
        let bin = fs::read(bin).with_context(|| format!("reading {}", bin.display()))?;
        run(&layers, &bin, input)
    }
}

fn with_suffix(stem: &Path, ext: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
