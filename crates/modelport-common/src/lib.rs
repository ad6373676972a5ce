//! Common types, errors and configuration for modelport
//!
//! This crate provides the foundational types shared by the archive reader,
//! the parameter reconstructor, the representation exporters and the
//! equivalence harness: element types, the owned [`Tensor`] buffer, the
//! error taxonomy, layered configuration and the seeded sample input.

pub mod config;
pub mod error;
pub mod sample;
pub mod tensor;
pub mod types;

pub use config::*;
pub use error::*;
pub use sample::SampleInput;
pub use tensor::Tensor;
pub use types::*;
