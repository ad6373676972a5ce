//! Parameter reconstruction: fill a skeleton from archive entries.

use crate::layers::{Layer, Linear, Model, NamedLayer, Parameter};
use crate::skeleton::{LayerKind, LayerSpec, ModelSkeleton};
use modelport_archive::ArchiveReader;
use modelport_common::{DType, ModelError, ReconstructionCause};
use std::collections::HashMap;
use tracing::{debug, info};

/// Build a [`Model`] from `skeleton`, reading every declared parameter from
/// `reader`. The first failure aborts the whole reconstruction.
pub fn reconstruct(reader: &ArchiveReader, skeleton: &ModelSkeleton) -> Result<Model, ModelError> {
    skeleton.validate()?;

    let mut layers = Vec::with_capacity(skeleton.layers.len());
    for spec in &skeleton.layers {
        let layer = reconstruct_layer(reader, spec)?;
        layers.push(NamedLayer { name: spec.name.clone(), layer });
    }

    let model = Model::new(layers);
    info!(
        archive = %reader.path().display(),
        layers = model.layers().len(),
        parameters = model.num_parameters(),
        "reconstructed model"
    );
    Ok(model)
}

fn reconstruct_layer(reader: &ArchiveReader, spec: &LayerSpec) -> Result<Layer, ModelError> {
    let expected = spec.kind.expected_params();
    let fail = |slot: &str, key: &str, cause: ReconstructionCause| ModelError::Reconstruction {
        layer: spec.name.clone(),
        parameter: slot.to_string(),
        key: key.to_string(),
        cause,
    };
    let structural = |slot: &str, key: &str, reason: String| fail(slot, key, ReconstructionCause::Structural(reason));

    let mut bound: HashMap<String, Parameter> = HashMap::new();
    for p in spec.param_specs() {
        let Some((_, want)) = expected.iter().find(|(slot, _)| *slot == p.slot) else {
            return Err(structural(
                &p.slot,
                &p.key,
                format!("{} layer has no `{}` slot", spec.kind.name(), p.slot),
            ));
        };
        if bound.contains_key(&p.slot) {
            return Err(structural(&p.slot, &p.key, "slot bound twice".into()));
        }
        if &p.shape != want {
            return Err(structural(
                &p.slot,
                &p.key,
                format!("declared shape {:?} but the layer expects {want:?}", p.shape),
            ));
        }
        let dtype: DType = p.dtype.parse().map_err(|e| fail(&p.slot, &p.key, ReconstructionCause::Archive(e)))?;
        if !dtype.is_float() {
            return Err(structural(&p.slot, &p.key, format!("{dtype} storage for a float parameter")));
        }

        let tensor = reader.extract(&p.key, &p.shape, dtype).map_err(|e| fail(&p.slot, &p.key, e.into()))?;
        debug!(layer = %spec.name, slot = %p.slot, key = %p.key, shape = ?p.shape, %dtype, "bound parameter");
        bound.insert(p.slot.clone(), Parameter { tensor, requires_grad: p.requires_grad });
    }

    if let Some((slot, _)) = expected.iter().find(|(slot, _)| !bound.contains_key(*slot)) {
        return Err(structural(slot, &format!("{}.{slot}", spec.name), "no binding for slot".into()));
    }

    match spec.kind {
        LayerKind::Linear { .. } => {
            let weight = bound.remove("weight");
            let bias = bound.remove("bias");
            let weight = weight.ok_or_else(|| structural("weight", &spec.name, "no binding for slot".into()))?;
            Ok(Layer::Linear(Linear::new(weight, bias)?))
        }
        LayerKind::Relu => Ok(Layer::Relu),
        LayerKind::Sigmoid => Ok(Layer::Sigmoid),
        LayerKind::Tanh => Ok(Layer::Tanh),
        LayerKind::Flatten => Ok(Layer::Flatten),
    }
}
