//! Model skeletons, typed layers and reconstruction from a tensor archive

pub mod layers;
pub mod reconstruct;
pub mod skeleton;

pub use layers::{Layer, Linear, Model, NamedLayer, Parameter};
pub use reconstruct::reconstruct;
pub use skeleton::{LayerKind, LayerSpec, ModelSkeleton, ParamSpec, SkeletonBuilder};
