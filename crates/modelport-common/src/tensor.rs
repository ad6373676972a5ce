//! Owned tensor buffers
//!
//! A [`Tensor`] owns a contiguous little-endian byte buffer together with its
//! shape and element type. Buffers are always full copies: a tensor never
//! borrows from the archive or from any staging storage it was read through.

use crate::error::TensorError;
use crate::types::DType;
use candle_core::{Device, Tensor as CandleTensor};
use half::{bf16, f16};

/// Typed, shaped numeric buffer in row-major (C) order.
///
/// Equality is bitwise over the raw buffer, so two tensors compare equal only
/// when they are bit-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

/// Number of elements described by `shape`, or `None` on overflow.
///
/// The empty shape describes a scalar and has one element.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Bytes needed to hold `shape` elements of `dtype`, or `None` on overflow.
pub fn byte_len(shape: &[usize], dtype: DType) -> Option<usize> {
    element_count(shape)?.checked_mul(dtype.size())
}

impl Tensor {
    /// Wrap raw little-endian bytes, checking the length against the shape.
    pub fn from_bytes(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = byte_len(&shape, dtype).ok_or_else(|| TensorError::Overflow { shape: shape.clone() })?;
        if expected != data.len() {
            return Err(TensorError::LengthMismatch {
                shape,
                dtype: dtype.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }

    /// Build a float32 tensor from values.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self, TensorError> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(DType::Float32, shape, data)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.data.len() / self.dtype.size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decode every element as `f32`.
    ///
    /// Float types widen or narrow to `f32`; integers are converted with `as`;
    /// `bool` maps to `0.0`/`1.0`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let d = &self.data;
        match self.dtype {
            DType::Float32 => d.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
            DType::Float64 => d
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
                .collect(),
            DType::Float16 => {
                d.chunks_exact(2).map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32()).collect()
            }
            DType::BFloat16 => {
                d.chunks_exact(2).map(|c| bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32()).collect()
            }
            DType::Int8 => d.iter().map(|&b| b as i8 as f32).collect(),
            DType::UInt8 => d.iter().map(|&b| b as f32).collect(),
            DType::Bool => d.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
            DType::Int16 => d.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]]) as f32).collect(),
            DType::Int32 => d.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32).collect(),
            DType::Int64 => d
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
                .collect(),
        }
    }

    /// Convert to a float32 candle tensor on the CPU.
    pub fn to_candle(&self) -> Result<CandleTensor, TensorError> {
        Ok(CandleTensor::from_vec(self.to_f32_vec(), self.shape.clone(), &Device::Cpu)?)
    }

    /// Copy a candle tensor back into an owned float32 tensor.
    pub fn from_candle(tensor: &CandleTensor) -> Result<Self, TensorError> {
        let shape = tensor.dims().to_vec();
        let values = tensor.to_dtype(candle_core::DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Self::from_f32(shape, &values)
    }

    /// Same data viewed under a new shape with the same element count.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, TensorError> {
        Self::from_bytes(self.dtype, shape, self.data)
    }
}
