//! Element types and representation identifiers

use crate::error::ArchiveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-width element type of a tensor buffer.
///
/// All types are stored little-endian in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
    Float16,
    BFloat16,
    Int8,
    UInt8,
    Int16,
    Int32,
    Int64,
    Bool,
}

impl DType {
    /// Every element type the archive reader understands.
    pub const ALL: [DType; 10] = [
        DType::Float32,
        DType::Float64,
        DType::Float16,
        DType::BFloat16,
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Bool,
    ];

    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
            Self::Float16 | Self::BFloat16 | Self::Int16 => 2,
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
        }
    }

    /// Canonical name, as written in skeleton files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64 | Self::Float16 | Self::BFloat16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = ArchiveError;

    /// Parse an element type name. Accepts the canonical names plus the
    /// short aliases (`f32`, `i64`, `half`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" | "float" => Ok(Self::Float32),
            "float64" | "f64" | "double" => Ok(Self::Float64),
            "float16" | "f16" | "half" => Ok(Self::Float16),
            "bfloat16" | "bf16" => Ok(Self::BFloat16),
            "int8" | "i8" => Ok(Self::Int8),
            "uint8" | "u8" => Ok(Self::UInt8),
            "int16" | "i16" | "short" => Ok(Self::Int16),
            "int32" | "i32" | "int" => Ok(Self::Int32),
            "int64" | "i64" | "long" => Ok(Self::Int64),
            "bool" => Ok(Self::Bool),
            _ => Err(ArchiveError::UnsupportedType { name: s.to_string() }),
        }
    }
}

/// One of the exported forms a model can be verified through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepresentationKind {
    /// Traced, replayable program form.
    Trace,
    /// Interchange graph form.
    Graph,
    /// Compact inference-engine form (param + bin pair).
    Engine,
}

impl RepresentationKind {
    pub const ALL: [RepresentationKind; 3] = [Self::Trace, Self::Graph, Self::Engine];

    /// Short name used on the command line and in reports.
    ///
    /// # Examples
    ///
    /// ```
    /// use modelport_common::RepresentationKind;
    ///
    /// assert_eq!(RepresentationKind::Graph.name(), "graph");
    /// ```
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Graph => "graph",
            Self::Engine => "engine",
        }
    }

    pub const fn full_name(&self) -> &'static str {
        match self {
            Self::Trace => "trace program",
            Self::Graph => "interchange graph",
            Self::Engine => "inference engine",
        }
    }

    /// Parse a representation from its name or a common alias.
    ///
    /// # Examples
    ///
    /// ```
    /// use modelport_common::RepresentationKind;
    ///
    /// assert_eq!(RepresentationKind::from_name("trace"), Some(RepresentationKind::Trace));
    /// assert_eq!(RepresentationKind::from_name("interchange"), Some(RepresentationKind::Graph));
    /// assert_eq!(RepresentationKind::from_name("unknown"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" | "traced" => Some(Self::Trace),
            "graph" | "interchange" => Some(Self::Graph),
            "engine" => Some(Self::Engine),
            _ => None,
        }
    }
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_sizes() {
        assert_eq!(DType::Float32.size(), 4);
        assert_eq!(DType::Float64.size(), 8);
        assert_eq!(DType::BFloat16.size(), 2);
        assert_eq!(DType::Bool.size(), 1);
        assert_eq!(DType::Int64.size(), 8);
    }

    #[test]
    fn dtype_names_parse_back() {
        for dtype in DType::ALL {
            assert_eq!(dtype.as_str().parse::<DType>().unwrap(), dtype);
        }
    }

    #[test]
    fn dtype_aliases() {
        assert_eq!("f32".parse::<DType>().unwrap(), DType::Float32);
        assert_eq!(" Float16 ".parse::<DType>().unwrap(), DType::Float16);
        assert_eq!("long".parse::<DType>().unwrap(), DType::Int64);
    }

    #[test]
    fn unknown_dtype_is_unsupported() {
        let err = "complex64".parse::<DType>().unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedType { ref name } if name == "complex64"));
    }

    #[test]
    fn dtype_serde_uses_canonical_names() {
        let json = serde_json::to_string(&DType::BFloat16).unwrap();
        assert_eq!(json, "\"bfloat16\"");
        let back: DType = serde_json::from_str("\"uint8\"").unwrap();
        assert_eq!(back, DType::UInt8);
    }

    #[test]
    fn representation_names_roundtrip() {
        for kind in RepresentationKind::ALL {
            assert_eq!(RepresentationKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(RepresentationKind::Engine.to_string(), "engine");
    }
}
