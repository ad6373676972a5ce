//! Interchange-graph collaborator: a node/initializer graph in JSON, run by
//! topological interpretation over candle ops.

use crate::collaborators::InterchangeGraph;
use anyhow::{Context, anyhow, bail, ensure};
use candle_core::{Device, Tensor as CandleTensor};
use modelport_common::Tensor;
use modelport_models::{Layer, Model};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const OPSET_VERSION: u32 = 13;
pub const INPUT_NAME: &str = "in0";
pub const OUTPUT_NAME: &str = "out0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub producer: String,
    pub opset: u32,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub initializers: Vec<Initializer>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, i64>,
}

impl GraphDocument {
    /// Lower `model` to a graph. Rank-1 inputs are exported as a single row.
    pub fn from_model(model: &Model, input_shape: &[usize], output_shape: &[usize]) -> Self {
        let mut initializers = Vec::new();
        let mut nodes = Vec::new();
        let mut current = INPUT_NAME.to_string();
        let last = model.layers().len().saturating_sub(1);

        for (i, named) in model.layers().iter().enumerate() {
            let output = if i == last { OUTPUT_NAME.to_string() } else { format!("{}_out", named.name) };
            let mut inputs = vec![current.clone()];
            let mut attributes = BTreeMap::new();
            let op_type = match &named.layer {
                Layer::Linear(l) => {
                    for (slot, p) in named.layer.parameters() {
                        let name = format!("{}.{slot}", named.name);
                        initializers.push(Initializer {
                            name: name.clone(),
                            dims: p.tensor.shape().to_vec(),
                            data: p.tensor.to_f32_vec(),
                        });
                        inputs.push(name);
                    }
                    attributes.insert("transB".into(), 1);
                    debug_assert_eq!(inputs.len(), if l.bias.is_some() { 3 } else { 2 });
                    "Gemm"
                }
                Layer::Relu => "Relu",
                Layer::Sigmoid => "Sigmoid",
                Layer::Tanh => "Tanh",
                Layer::Flatten => {
                    attributes.insert("axis".into(), 1);
                    "Flatten"
                }
            };
            nodes.push(Node {
                name: named.name.clone(),
                op_type: op_type.into(),
                inputs,
                outputs: vec![output.clone()],
                attributes,
            });
            current = output;
        }

        Self {
            producer: concat!("modelport ", env!("CARGO_PKG_VERSION")).into(),
            opset: OPSET_VERSION,
            inputs: vec![ValueInfo { name: INPUT_NAME.into(), shape: input_shape.to_vec() }],
            outputs: vec![ValueInfo { name: OUTPUT_NAME.into(), shape: output_shape.to_vec() }],
            initializers,
            nodes,
        }
    }

    /// Evaluate the graph on `input`, scheduling nodes once all their inputs exist.
    pub fn execute(&self, input: &Tensor) -> anyhow::Result<Tensor> {
        let [graph_in] = self.inputs.as_slice() else { bail!("graph must have exactly one input") };
        let [graph_out] = self.outputs.as_slice() else { bail!("graph must have exactly one output") };

        let mut values: HashMap<&str, CandleTensor> = HashMap::new();
        for init in &self.initializers {
            let t = CandleTensor::from_vec(init.data.clone(), init.dims.as_slice(), &Device::Cpu)
                .with_context(|| format!("initializer `{}`", init.name))?;
            values.insert(init.name.as_str(), t);
        }

        let mut x = input.to_candle()?;
        let single_row = x.rank() == 1;
        if single_row {
            x = x.unsqueeze(0)?;
        }
        values.insert(graph_in.name.as_str(), x);

        let mut pending: Vec<&Node> = self.nodes.iter().collect();
        while !pending.is_empty() {
            let ready = pending.iter().position(|n| n.inputs.iter().all(|i| values.contains_key(i.as_str())));
            let Some(idx) = ready else {
                let stuck: Vec<_> = pending.iter().map(|n| n.name.as_str()).collect();
                bail!("graph has unresolved inputs or a cycle at nodes {stuck:?}");
            };
            let node = pending.remove(idx);
            let args = node
                .inputs
                .iter()
                .map(|i| values.get(i.as_str()).ok_or_else(|| anyhow!("value `{i}` vanished")))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let out = run_node(node, &args).with_context(|| format!("node `{}` ({})", node.name, node.op_type))?;
            let [out_name] = node.outputs.as_slice() else { bail!("node `{}` must have one output", node.name) };
            values.insert(out_name.as_str(), out);
        }

        let mut out = values.remove(graph_out.name.as_str()).ok_or_else(|| anyhow!("graph never produced `{}`", graph_out.name))?;
        if single_row && out.rank() == 2 && out.dim(0)? == 1 {
            out = out.squeeze(0)?;
        }
        Ok(Tensor::from_candle(&out)?)
    }
}

fn run_node(node: &Node, args: &[&CandleTensor]) -> anyhow::Result<CandleTensor> {
    let attr = |key: &str, default: i64| node.attributes.get(key).copied().unwrap_or(default);
    let out = match (node.op_type.as_str(), args) {
        ("Gemm", [a, b, rest @ ..]) => {
            let b = if attr("transB", 0) == 1 { b.t()? } else { (*b).clone() };
            let y = a.matmul(&b)?;
            match rest {
                [] => y,
                [c] => y.broadcast_add(c)?,
                _ => bail!("Gemm takes at most three inputs"),
            }
        }
        ("Relu", [x]) => x.relu()?,
        ("Sigmoid", [x]) => x.neg()?.exp()?.affine(1.0, 1.0)?.recip()?,
        ("Tanh", [x]) => x.tanh()?,
        ("Flatten", [x]) => {
            let axis = usize::try_from(attr("axis", 1)).context("negative Flatten axis")?;
            ensure!(axis == 1, "only Flatten axis=1 is supported, got {axis}");
            x.flatten_from(1)?
        }
        (op, args) => bail!("unsupported op `{op}` with {} inputs", args.len()),
    };
    Ok(out)
}

/// Writes and executes [`GraphDocument`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInterchangeGraph;

impl InterchangeGraph for JsonInterchangeGraph {
    fn to_interchange_graph(&self, model: &Model, sample: &Tensor, out: &Path) -> anyhow::Result<PathBuf> {
        let output = model.forward(sample).context("shape inference")?;
        let doc = GraphDocument::from_model(model, sample.shape(), output.shape());

        let mut writer = BufWriter::new(File::create(out).with_context(|| format!("creating {}", out.display()))?);
        serde_json::to_writer_pretty(&mut writer, &doc).context("serializing graph")?;
        writer.flush()?;
        Ok(out.to_path_buf())
    }

    fn execute(&self, graph: &Path, input: &Tensor) -> anyhow::Result<Tensor> {
        let file = File::open(graph).with_context(|| format!("opening {}", graph.display()))?;
        let doc: GraphDocument =
            serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", graph.display()))?;
        ensure!(doc.opset <= OPSET_VERSION, "opset {} is newer than supported {OPSET_VERSION}", doc.opset);
        doc.execute(input)
    }
}
